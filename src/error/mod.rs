mod atelier;
mod oauth;

pub use atelier::{ApiErrorBody, ApiErrorObject, AtelierError};
pub use oauth::OauthError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
