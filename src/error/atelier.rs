use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::oauth::OauthError;

#[derive(Debug, ThisError)]
pub enum AtelierError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{provider} error: {message}")]
    ExternalProvider {
        provider: &'static str,
        message: String,
    },

    #[error(transparent)]
    Oauth(#[from] OauthError),

    #[error("Feed '{feed}' unavailable: {message}")]
    FeedUnavailable { feed: String, message: String },

    #[error("Feed '{feed}' malformed: {message}")]
    FeedMalformed { feed: String, message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Credential for artist {artist_id} changed concurrently")]
    ConcurrencyConflict { artist_id: i64 },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AtelierError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AtelierError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        AtelierError::InvalidConfiguration(message.into())
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        AtelierError::ExternalProvider {
            provider,
            message: message.into(),
        }
    }

    /// Taxonomy bucket, used for source-failure annotations and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AtelierError::NotFound { .. } => "NotFound",
            AtelierError::InvalidConfiguration(_) => "InvalidConfiguration",
            AtelierError::ExternalProvider { .. }
            | AtelierError::Oauth(_)
            | AtelierError::Http(_) => "ExternalProviderError",
            AtelierError::FeedUnavailable { .. } => "FeedUnavailable",
            AtelierError::FeedMalformed { .. } => "FeedMalformed",
            AtelierError::Unauthorized => "Unauthorized",
            AtelierError::ConcurrencyConflict { .. } => "ConcurrencyConflict",
            AtelierError::Json(_)
            | AtelierError::Url(_)
            | AtelierError::Io(_)
            | AtelierError::Database(_)
            | AtelierError::Actor(_)
            | AtelierError::Unexpected(_) => "Internal",
        }
    }
}

impl IntoResponse for AtelierError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            AtelierError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                ApiErrorObject::new("NOT_FOUND", format!("{entity} {id} not found")),
            ),

            AtelierError::InvalidConfiguration(message) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject::new("INVALID_CONFIGURATION", message),
            ),

            AtelierError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorObject::new("UNAUTHORIZED", "Admin credential missing or invalid."),
            ),

            AtelierError::ConcurrencyConflict { .. } => (
                StatusCode::CONFLICT,
                ApiErrorObject::new("CONCURRENCY_CONFLICT", "Credential changed concurrently."),
            ),

            AtelierError::Oauth(OauthError::Flow { code, message }) => {
                (StatusCode::BAD_REQUEST, ApiErrorObject::new(&code, message))
            }

            AtelierError::FeedUnavailable { .. } | AtelierError::FeedMalformed { .. } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject::new("FEED_ERROR", "Public calendar feed error."),
            ),

            AtelierError::ExternalProvider { .. }
            | AtelierError::Oauth(_)
            | AtelierError::Http(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject::new("UPSTREAM_ERROR", "Upstream service error."),
            ),

            AtelierError::Json(_)
            | AtelierError::Url(_)
            | AtelierError::Io(_)
            | AtelierError::Database(_)
            | AtelierError::Actor(_)
            | AtelierError::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject::new("INTERNAL_ERROR", "An internal server error occurred."),
            ),
        };
        (status, Json(ApiErrorBody { inner: error_body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
}

impl ApiErrorObject {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}

impl IsRetryable for AtelierError {
    fn is_retryable(&self) -> bool {
        match self {
            AtelierError::Http(_) => true,
            AtelierError::Oauth(e) => e.is_retryable(),
            _ => false,
        }
    }
}
