use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistCreate {
    pub name: String,
    pub linked_calendar_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCreate {
    pub title: String,
    /// Upsert key.
    pub slug: String,
    pub base_price: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub buffer_before_minutes: Option<i64>,
    pub buffer_after_minutes: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOverrideCreate {
    pub artist_id: i64,
    pub service_id: i64,
    pub price: Option<i64>,
    pub active: bool,
}

/// Upsert of one artist's credential row.
///
/// `refresh_token: None` keeps the stored refresh token. With `expected_generation`
/// set the write only lands if the row still carries that generation.
#[derive(Clone)]
pub struct CredentialWrite {
    pub artist_id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scope: String,
    pub expected_generation: Option<i64>,
}

impl std::fmt::Debug for CredentialWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialWrite")
            .field("artist_id", &self.artist_id)
            .field("refresh_token_set", &self.refresh_token.is_some())
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .field("expected_generation", &self.expected_generation)
            .finish_non_exhaustive()
    }
}
