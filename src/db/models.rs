use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbArtist {
    pub id: i64,
    pub name: String,
    pub linked_calendar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored OAuth credential. `Debug` redacts both tokens.
#[derive(Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbCredential {
    pub artist_id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scope: String,
    /// Bumped on every write; the compare-and-swap key for refresh writes.
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for DbCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredential")
            .field("artist_id", &self.artist_id)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl DbCredential {
    /// Stale once `now >= expiry - margin`. Detected lazily at use time.
    ///
    /// The margin is capped at half the lifetime the token was written with, so
    /// a grant shorter than the margin is used for a while instead of being
    /// refreshed on every lookup.
    pub fn is_stale(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        let half_life = (self.expiry - self.updated_at) / 2;
        let margin = margin.min(half_life).max(TimeDelta::zero());
        now >= self.expiry - margin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbService {
    pub id: i64,
    pub title: String,
    pub slug: String,
    /// Minor currency units.
    pub base_price: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub buffer_before_minutes: Option<i64>,
    pub buffer_after_minutes: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbServiceOverride {
    pub id: i64,
    pub artist_id: i64,
    pub service_id: i64,
    /// Minor currency units.
    pub price: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
