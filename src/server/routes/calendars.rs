use crate::calendar::{CalendarSummary, ClientLookup};
use crate::error::AtelierError;
use crate::server::router::AtelierState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPrimaryRequest {
    pub artist_id: Option<i64>,
    pub calendar_id: Option<String>,
}

/// GET /admin/artists/{artist_id}/calendars
///
/// Empty list when the artist has no linked calendar.
pub async fn list_calendars(
    State(state): State<AtelierState>,
    Path(artist_id): Path<i64>,
) -> Result<Json<Vec<CalendarSummary>>, AtelierError> {
    if state.core.db.get_artist(artist_id).await?.is_none() {
        return Err(AtelierError::not_found("artist", artist_id));
    }

    match state.core.calendars.get_client_for_artist(artist_id).await? {
        ClientLookup::NotLinked => Ok(Json(Vec::new())),
        ClientLookup::Client(client) => Ok(Json(client.list_calendars().await?)),
    }
}

/// PUT /admin/calendar/primary
pub async fn set_primary_calendar(
    State(state): State<AtelierState>,
    payload: Result<Json<SetPrimaryRequest>, JsonRejection>,
) -> Result<StatusCode, AtelierError> {
    let Json(req) = payload.map_err(|e| AtelierError::invalid_config(e.body_text()))?;
    let artist_id = req
        .artist_id
        .ok_or_else(|| AtelierError::invalid_config("artistId is required"))?;
    let calendar_id = req
        .calendar_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AtelierError::invalid_config("calendarId is required"))?;

    if state.core.db.get_artist(artist_id).await?.is_none() {
        return Err(AtelierError::not_found("artist", artist_id));
    }
    if state.core.credentials.load(artist_id).await?.is_none() {
        return Err(AtelierError::invalid_config(format!(
            "artist {artist_id} has no linked calendar account"
        )));
    }

    state
        .core
        .db
        .set_linked_calendar(artist_id, Some(calendar_id.clone()))
        .await?;
    info!(artist_id, calendar_id = %calendar_id, "primary calendar set");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/artists/{artist_id}/calendar
pub async fn unlink_calendar(
    State(state): State<AtelierState>,
    Path(artist_id): Path<i64>,
) -> Result<StatusCode, AtelierError> {
    state.core.oauth.unlink(artist_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
