use crate::db::{CredentialWrite, DbActorHandle, DbCredential};
use crate::error::AtelierError;
use chrono::{DateTime, Utc};
use tracing::info;

/// Token material returned by the provider, ready to persist.
///
/// `refresh_token: None` means the provider omitted it; the stored one is kept.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scope: String,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token_set", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// One credential row per artist, written atomically by the DB actor.
#[derive(Clone)]
pub struct CredentialStore {
    db: DbActorHandle,
}

impl CredentialStore {
    pub fn new(db: DbActorHandle) -> Self {
        Self { db }
    }

    /// Unconditional upsert (fresh link). Returns the new generation.
    pub async fn save(&self, artist_id: i64, grant: TokenGrant) -> Result<i64, AtelierError> {
        self.write(artist_id, grant, None).await
    }

    /// Upsert only if the stored row still carries `expected_generation`.
    ///
    /// Fails with [`AtelierError::ConcurrencyConflict`] otherwise, so a late
    /// refresh never clobbers a newer credential.
    pub async fn save_if(
        &self,
        artist_id: i64,
        grant: TokenGrant,
        expected_generation: i64,
    ) -> Result<i64, AtelierError> {
        self.write(artist_id, grant, Some(expected_generation)).await
    }

    pub async fn load(&self, artist_id: i64) -> Result<Option<DbCredential>, AtelierError> {
        self.db.load_credential(artist_id).await
    }

    /// Remove the artist's credential. Returns whether a row was deleted.
    pub async fn delete(&self, artist_id: i64) -> Result<bool, AtelierError> {
        let deleted = self.db.delete_credential(artist_id, None).await?;
        if deleted {
            info!(artist_id, "credential removed");
        }
        Ok(deleted)
    }

    /// Remove the credential only if it is still at `generation`.
    pub async fn delete_if(&self, artist_id: i64, generation: i64) -> Result<bool, AtelierError> {
        let deleted = self
            .db
            .delete_credential(artist_id, Some(generation))
            .await?;
        if deleted {
            info!(artist_id, generation, "credential revoked by provider, removed");
        }
        Ok(deleted)
    }

    async fn write(
        &self,
        artist_id: i64,
        grant: TokenGrant,
        expected_generation: Option<i64>,
    ) -> Result<i64, AtelierError> {
        self.db
            .save_credential(CredentialWrite {
                artist_id,
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                expiry: grant.expiry,
                scope: grant.scope,
                expected_generation,
            })
            .await
    }
}
