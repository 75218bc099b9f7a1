use crate::busy::BusyAggregator;
use crate::calendar::CalendarClientFactory;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::db::DbActorHandle;
use crate::error::AtelierError;
use crate::http::build_http_client;
use crate::oauth::{OauthEndpoints, OauthFlow};
use crate::pricing::QuoteResolver;
use crate::signing::Signer;
use std::sync::Arc;
use tracing::info;

/// Every component, wired to one storage handle.
///
/// Kept as a plain struct: handlers pick the piece they need.
#[derive(Clone)]
pub struct Core {
    pub db: DbActorHandle,
    pub signer: Signer,
    pub credentials: CredentialStore,
    pub oauth: OauthFlow,
    pub calendars: CalendarClientFactory,
    pub busy: BusyAggregator,
    pub quotes: QuoteResolver,
}

impl Core {
    pub fn build(db: DbActorHandle, cfg: &Config) -> Result<Self, AtelierError> {
        let oauth_cfg = cfg.oauth()?;
        let calendar_cfg = Arc::new(cfg.calendar()?);
        let feeds_cfg = Arc::new(cfg.feeds()?);

        // Log resolved configs here so `main` stays wiring-only.
        info!(
            oauth_auth_url = %oauth_cfg.auth_url,
            oauth_token_url = %oauth_cfg.token_url,
            oauth_redirect_url = %oauth_cfg.redirect_url,
            oauth_revocation = oauth_cfg.revocation_url.is_some(),
            oauth_state_ttl = ?oauth_cfg.state_ttl,
            oauth_refresh_margin = ?oauth_cfg.refresh_margin,
            "OAuth config (effective)"
        );
        info!(
            calendar_api_url = %calendar_cfg.api_url,
            calendar_lookahead_days = calendar_cfg.lookahead.num_days(),
            calendar_max_pages = calendar_cfg.max_pages,
            calendar_timeout = ?calendar_cfg.http.request_timeout,
            "Calendar config (effective)"
        );
        info!(
            studio_timezone = %feeds_cfg.studio_timezone,
            feed_sources = feeds_cfg.sources.len(),
            feed_timeout = ?feeds_cfg.http.request_timeout,
            "Feeds config (effective)"
        );

        let signer = Signer::new(&cfg.server.signing_secret);
        let credentials = CredentialStore::new(db.clone());
        let endpoints = Arc::new(OauthEndpoints::new(&oauth_cfg)?);

        let oauth = OauthFlow::new(
            db.clone(),
            credentials.clone(),
            endpoints.clone(),
            signer.clone(),
            &oauth_cfg,
        );

        let calendars = CalendarClientFactory::new(
            credentials.clone(),
            endpoints,
            build_http_client(&calendar_cfg.http)?,
            calendar_cfg.clone(),
            oauth_cfg.refresh_margin,
        );

        let busy = BusyAggregator::new(
            db.clone(),
            calendars.clone(),
            feeds_cfg.clone(),
            build_http_client(&feeds_cfg.http)?,
            calendar_cfg.http.request_timeout,
            calendar_cfg.lookahead,
        );

        let quotes = QuoteResolver::new(db.clone());

        Ok(Self {
            db,
            signer,
            credentials,
            oauth,
            calendars,
            busy,
            quotes,
        })
    }
}
