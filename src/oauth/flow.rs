use super::endpoints::{OauthEndpoints, revocable_token};
use crate::config::OauthResolvedConfig;
use crate::credentials::CredentialStore;
use crate::db::DbActorHandle;
use crate::error::{AtelierError, OauthError};
use crate::signing::{PURPOSE_OAUTH_STATE, Signer, TokenRejection};
use base64::Engine as _;
use chrono::Utc;
use moka::future::Cache;
use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const PENDING_AUTH_CAPACITY: u64 = 10_000;

/// Signed into the `state` parameter.
#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    artist_id: i64,
    nonce: String,
}

/// Server-side half of an authorization in progress, keyed by nonce.
#[derive(Clone)]
struct PendingAuth {
    artist_id: i64,
    pkce_verifier: String,
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Drives authorization start, callback and unlink for one provider.
#[derive(Clone)]
pub struct OauthFlow {
    db: DbActorHandle,
    store: CredentialStore,
    endpoints: Arc<OauthEndpoints>,
    signer: Signer,
    pending: Cache<String, PendingAuth>,
    state_ttl: Duration,
    confirm_url: String,
}

impl OauthFlow {
    pub fn new(
        db: DbActorHandle,
        store: CredentialStore,
        endpoints: Arc<OauthEndpoints>,
        signer: Signer,
        cfg: &OauthResolvedConfig,
    ) -> Self {
        let pending = Cache::builder()
            .max_capacity(PENDING_AUTH_CAPACITY)
            .time_to_live(cfg.state_ttl)
            .build();

        Self {
            db,
            store,
            endpoints,
            signer,
            pending,
            state_ttl: cfg.state_ttl,
            confirm_url: cfg.confirm_url.clone(),
        }
    }

    /// Consent URL for `artist_id`, bound to a signed, expiring, single-use state.
    pub async fn authorization_url(&self, artist_id: i64) -> Result<Url, AtelierError> {
        self.require_artist(artist_id).await?;

        let nonce = generate_nonce();
        let state = self.signer.sign(
            PURPOSE_OAUTH_STATE,
            &StateClaims {
                artist_id,
                nonce: nonce.clone(),
            },
            self.state_ttl,
        )?;

        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        self.pending
            .insert(
                nonce,
                PendingAuth {
                    artist_id,
                    pkce_verifier: verifier.secret().to_string(),
                },
            )
            .await;

        info!(artist_id, "authorization started");
        Ok(self.endpoints.authorize_url(state, challenge))
    }

    /// Verify `state`, consume its pending entry and exchange `code`.
    ///
    /// Every failure here is a client error: nothing is persisted.
    pub async fn complete(&self, code: &str, state: &str) -> Result<i64, AtelierError> {
        let claims: StateClaims = self
            .signer
            .verify(PURPOSE_OAUTH_STATE, state)
            .map_err(|rejection| match rejection {
                TokenRejection::Expired => OauthError::flow("STATE_EXPIRED", "state has expired"),
                other => OauthError::flow("STATE_INVALID", other.to_string()),
            })?;

        let pending = self.pending.remove(&claims.nonce).await.ok_or_else(|| {
            OauthError::flow("STATE_REPLAYED", "state was already used or has expired")
        })?;

        if pending.artist_id != claims.artist_id {
            return Err(OauthError::flow(
                "STATE_INVALID",
                "state does not match pending authorization",
            )
            .into());
        }

        let verifier = PkceCodeVerifier::new(pending.pkce_verifier);
        self.exchange_code(claims.artist_id, code, Some(verifier))
            .await
            .map_err(|e| match e {
                AtelierError::ExternalProvider { message, .. } => {
                    OauthError::flow("CODE_REJECTED", message).into()
                }
                other => other,
            })?;

        Ok(claims.artist_id)
    }

    /// Exchange `code` and persist the credential. Writes nothing on failure.
    pub async fn exchange_code(
        &self,
        artist_id: i64,
        code: &str,
        verifier: Option<PkceCodeVerifier>,
    ) -> Result<i64, AtelierError> {
        self.require_artist(artist_id).await?;

        let token = self
            .endpoints
            .exchange_code(code, verifier)
            .await
            .map_err(|e| match e {
                OauthError::Request(e) => AtelierError::Http(e),
                other => {
                    warn!(artist_id, error = %other, "authorization code rejected");
                    AtelierError::provider("oauth", other.to_string())
                }
            })?;

        let grant = self.endpoints.grant_from(&token, Utc::now());
        if grant.refresh_token.is_none() && self.store.load(artist_id).await?.is_none() {
            return Err(AtelierError::provider(
                "oauth",
                "provider issued no refresh token for a new link",
            ));
        }

        let generation = self.store.save(artist_id, grant).await?;
        info!(artist_id, generation, "calendar linked");
        Ok(generation)
    }

    /// Drop the artist's credential and chosen calendar, then revoke at the
    /// provider in the background.
    pub async fn unlink(&self, artist_id: i64) -> Result<bool, AtelierError> {
        self.require_artist(artist_id).await?;

        let existing = self.store.load(artist_id).await?;
        let deleted = self.store.delete(artist_id).await?;
        self.db.set_linked_calendar(artist_id, None).await?;

        if let Some(cred) = existing {
            let token = revocable_token(cred);
            let endpoints = self.endpoints.clone();
            tokio::spawn(async move {
                endpoints.revoke(token).await;
            });
        }

        info!(artist_id, deleted, "calendar unlinked");
        Ok(deleted)
    }

    /// Where the callback sends the admin after a successful link.
    pub fn confirm_location(&self, artist_id: i64) -> String {
        let sep = if self.confirm_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}artist={artist_id}&linked=true", self.confirm_url)
    }

    async fn require_artist(&self, artist_id: i64) -> Result<(), AtelierError> {
        match self.db.get_artist(artist_id).await? {
            Some(_) => Ok(()),
            None => Err(AtelierError::not_found("artist", artist_id)),
        }
    }
}
