use crate::error::{AtelierError, OauthError};
use crate::server::router::AtelierState;
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when consent was denied.
    pub error: Option<String>,
}

/// GET /admin/artists/{artist_id}/calendar/auth
///
/// Redirects the admin's browser to the provider consent screen.
pub async fn oauth_entry(
    State(state): State<AtelierState>,
    Path(artist_id): Path<i64>,
) -> Result<Redirect, AtelierError> {
    let url = state.core.oauth.authorization_url(artist_id).await?;
    info!(artist_id, "dispatching OAuth redirect");
    Ok(Redirect::temporary(url.as_str()))
}

/// GET /oauth2callback
pub async fn oauth_callback(
    State(state): State<AtelierState>,
    Query(query): Query<AuthCallbackQuery>,
) -> Result<Redirect, AtelierError> {
    if let Some(error) = query.error {
        warn!(error = %error, "provider returned an OAuth error");
        let message = format!("provider returned '{error}'");
        return Err(OauthError::flow("CONSENT_DENIED", message).into());
    }

    let (Some(code), Some(state_param)) = (query.code, query.state) else {
        return Err(OauthError::flow("CALLBACK_INVALID", "missing code or state").into());
    };

    let artist_id = state
        .core
        .oauth
        .complete(&code, &state_param)
        .await
        .inspect_err(|e| warn!(error = %e, "OAuth callback rejected"))?;

    Ok(Redirect::to(&state.core.oauth.confirm_location(artist_id)))
}
