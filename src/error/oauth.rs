use super::IsRetryable;
use axum::http::StatusCode;
use oauth2::basic::BasicErrorResponseType;
use oauth2::{RequestTokenError, StandardErrorResponse};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum OauthError {
    /// Callback-side failure (bad/expired/replayed state, provider-denied consent).
    #[error("OAuth flow error: {message}")]
    Flow { code: String, message: String },

    #[error("OAuth2 request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OAuth2 upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("OAuth2 server response error: {error}")]
    ServerResponse {
        error: String,
        description: Option<String>,
    },

    #[error("OAuth2 token endpoint parse error: {message}. Body: {body}")]
    Parse { message: String, body: String },

    #[error("OAuth2 unexpected error: {message}")]
    Other { message: String },
}

impl OauthError {
    pub fn flow(code: &str, message: impl Into<String>) -> Self {
        OauthError::Flow {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// The provider considers the refresh token (or code) dead.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, OauthError::ServerResponse { error, .. } if error == "invalid_grant")
    }
}

impl IsRetryable for OauthError {
    fn is_retryable(&self) -> bool {
        match self {
            OauthError::Request(_) => true,
            OauthError::UpstreamStatus(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

/// Token endpoint failure as seen through `send_checked`, which already turned
/// transport errors and 429/5xx into `OauthError`.
type TokenEndpointError =
    RequestTokenError<OauthError, StandardErrorResponse<BasicErrorResponseType>>;

impl From<TokenEndpointError> for OauthError {
    fn from(e: TokenEndpointError) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => OauthError::ServerResponse {
                error: err.error().to_string(),
                description: err.error_description().cloned(),
            },
            RequestTokenError::Request(inner) => inner,
            RequestTokenError::Parse(parse_err, body) => {
                let body_str = String::from_utf8_lossy(&body);
                let body = body_str
                    .char_indices()
                    .nth(100)
                    .map_or_else(
                        || body_str.to_string(),
                        |(idx, _)| format!("{}...<truncated>", &body_str[..idx]),
                    );
                OauthError::Parse {
                    message: parse_err.to_string(),
                    body,
                }
            }
            RequestTokenError::Other(s) => OauthError::Other { message: s },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_transient_statuses_are_retried() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(OauthError::UpstreamStatus(status).is_retryable());
        }
        assert!(!OauthError::UpstreamStatus(StatusCode::BAD_REQUEST).is_retryable());

        let invalid_grant = OauthError::ServerResponse {
            error: "invalid_grant".to_string(),
            description: None,
        };
        assert!(invalid_grant.is_invalid_grant());
        assert!(!invalid_grant.is_retryable());
    }

    #[test]
    fn status_errors_pass_through_the_token_error_wrapper() {
        let wrapped: TokenEndpointError =
            RequestTokenError::Request(OauthError::UpstreamStatus(StatusCode::BAD_GATEWAY));
        assert!(matches!(
            OauthError::from(wrapped),
            OauthError::UpstreamStatus(StatusCode::BAD_GATEWAY)
        ));
    }
}
