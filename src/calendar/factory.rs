use super::client::CalendarClient;
use crate::config::CalendarResolvedConfig;
use crate::credentials::CredentialStore;
use crate::db::DbCredential;
use crate::error::{AtelierError, OauthError};
use crate::oauth::OauthEndpoints;
use chrono::{TimeDelta, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Idle per-artist refresh locks are dropped after this long.
const REFRESH_LOCK_IDLE: Duration = Duration::from_secs(10 * 60);

/// Read-refresh-write attempts before a lost compare-and-swap is surfaced.
const REFRESH_ATTEMPTS: usize = 2;

#[derive(Debug)]
pub enum ClientLookup {
    /// No credential, or the provider revoked it. Re-run authorization.
    NotLinked,
    Client(CalendarClient),
}

/// Hands out calendar clients built from a token that is fresh right now.
///
/// Stale tokens are refreshed on demand. Refresh is single-flight per artist:
/// callers queue on a per-artist lock and late arrivals find the credential
/// already rotated. The refresh itself runs detached so an abandoned request
/// still finishes (and persists) it.
#[derive(Clone)]
pub struct CalendarClientFactory {
    store: CredentialStore,
    endpoints: Arc<OauthEndpoints>,
    http: reqwest::Client,
    cfg: Arc<CalendarResolvedConfig>,
    refresh_margin: TimeDelta,
    locks: Cache<i64, Arc<Mutex<()>>>,
}

impl CalendarClientFactory {
    pub fn new(
        store: CredentialStore,
        endpoints: Arc<OauthEndpoints>,
        http: reqwest::Client,
        cfg: Arc<CalendarResolvedConfig>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            endpoints,
            http,
            cfg,
            refresh_margin: TimeDelta::from_std(refresh_margin).unwrap_or(TimeDelta::zero()),
            locks: Cache::builder().time_to_idle(REFRESH_LOCK_IDLE).build(),
        }
    }

    pub async fn get_client_for_artist(
        &self,
        artist_id: i64,
    ) -> Result<ClientLookup, AtelierError> {
        let Some(cred) = self.store.load(artist_id).await? else {
            return Ok(ClientLookup::NotLinked);
        };
        if !cred.is_stale(Utc::now(), self.refresh_margin) {
            return Ok(ClientLookup::Client(self.client_from(&cred)));
        }

        let lock = self
            .locks
            .get_with(artist_id, async { Arc::new(Mutex::new(())) })
            .await;
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            this.refresh_locked(artist_id).await
        })
        .await
        .map_err(|e| {
            AtelierError::Unexpected(format!("refresh task for artist {artist_id} failed: {e}"))
        })?
    }

    /// Runs under the artist's lock.
    async fn refresh_locked(&self, artist_id: i64) -> Result<ClientLookup, AtelierError> {
        for attempt in 1..=REFRESH_ATTEMPTS {
            let Some(cred) = self.store.load(artist_id).await? else {
                return Ok(ClientLookup::NotLinked);
            };
            if !cred.is_stale(Utc::now(), self.refresh_margin) {
                debug!(artist_id, "credential already refreshed by an earlier caller");
                return Ok(ClientLookup::Client(self.client_from(&cred)));
            }

            let Some(refresh_token) = cred.refresh_token.as_deref() else {
                warn!(artist_id, "stale credential has no refresh token");
                if self.store.delete_if(artist_id, cred.generation).await? {
                    return Ok(ClientLookup::NotLinked);
                }
                continue;
            };

            let token = match self.endpoints.refresh(refresh_token).await {
                Ok(token) => token,
                Err(e) if e.is_invalid_grant() => {
                    warn!(artist_id, "refresh token rejected by provider");
                    if self.store.delete_if(artist_id, cred.generation).await? {
                        return Ok(ClientLookup::NotLinked);
                    }
                    // A newer credential landed meanwhile; look again.
                    continue;
                }
                Err(OauthError::Request(e)) => return Err(AtelierError::Http(e)),
                Err(e) => return Err(AtelierError::provider("oauth", e.to_string())),
            };

            let now = Utc::now();
            let grant = self.endpoints.grant_from(&token, now);
            if grant.expiry - now <= self.refresh_margin {
                warn!(
                    artist_id,
                    lifetime_secs = (grant.expiry - now).num_seconds(),
                    "granted lifetime is shorter than the refresh margin"
                );
            }
            let access_token = grant.access_token.clone();
            match self.store.save_if(artist_id, grant, cred.generation).await {
                Ok(generation) => {
                    info!(artist_id, generation, "access token refreshed");
                    return Ok(ClientLookup::Client(self.client_with(access_token)));
                }
                Err(AtelierError::ConcurrencyConflict { .. }) => {
                    debug!(artist_id, attempt, "credential changed during refresh");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AtelierError::provider(
            "oauth",
            format!("credential for artist {artist_id} kept changing during refresh"),
        ))
    }

    fn client_from(&self, cred: &DbCredential) -> CalendarClient {
        self.client_with(cred.access_token.clone())
    }

    fn client_with(&self, access_token: String) -> CalendarClient {
        CalendarClient::new(
            self.http.clone(),
            self.cfg.api_url.clone(),
            access_token,
            self.cfg.max_pages,
        )
    }
}
