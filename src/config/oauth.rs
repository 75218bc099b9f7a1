use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::network::{HttpSettings, NetworkDefaults};
use crate::error::AtelierError;

/// Calendar-provider OAuth configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OauthConfig {
    /// TOML: `oauth.client_id`.
    #[serde(default)]
    pub client_id: String,

    /// TOML: `oauth.client_secret`.
    #[serde(default)]
    pub client_secret: String,

    /// Consent screen endpoint.
    /// TOML: `oauth.auth_url`. Default: Google's v2 auth endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Token endpoint used for code exchange and refresh.
    /// TOML: `oauth.token_url`.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Optional RFC 7009 revocation endpoint (https only), hit best-effort on unlink.
    /// TOML: `oauth.revocation_url`.
    #[serde(default = "default_revocation_url")]
    pub revocation_url: Option<String>,

    /// Pre-registered redirect URL pointing at `/oauth2callback`.
    /// TOML: `oauth.redirect_url`.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,

    /// Requested scopes (calendar read + calendar-list read).
    /// TOML: `oauth.scopes`.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Lifetime of a signed `state` value and its pending PKCE verifier.
    /// TOML: `oauth.state_ttl_secs`. Default: `600`.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// An access token is stale once `now >= expiry - refresh_margin`.
    /// TOML: `oauth.refresh_margin_secs`. Default: `300`.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    /// Per-call timeout against the token endpoint.
    /// TOML: `oauth.request_timeout_secs`. Default: `15`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Admin confirmation view the callback redirects to on success.
    /// TOML: `oauth.confirm_url`. Default: `/admin/calendar/linked`.
    #[serde(default = "default_confirm_url")]
    pub confirm_url: String,
}

#[derive(Debug, Clone)]
pub struct OauthResolvedConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: Url,
    pub token_url: Url,
    pub revocation_url: Option<Url>,
    pub redirect_url: Url,
    pub scopes: Vec<String>,
    pub state_ttl: Duration,
    pub refresh_margin: Duration,
    pub confirm_url: String,
    pub http: HttpSettings,
}

impl OauthConfig {
    pub fn resolve(&self, network: &NetworkDefaults) -> Result<OauthResolvedConfig, AtelierError> {
        let parse = |field: &str, raw: &str| {
            Url::parse(raw)
                .map_err(|e| AtelierError::invalid_config(format!("oauth.{field}: {e}")))
        };

        Ok(OauthResolvedConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_url: parse("auth_url", &self.auth_url)?,
            token_url: parse("token_url", &self.token_url)?,
            revocation_url: self
                .revocation_url
                .as_deref()
                .map(|raw| {
                    let url = parse("revocation_url", raw)?;
                    if url.scheme() != "https" {
                        return Err(AtelierError::invalid_config(
                            "oauth.revocation_url must use https",
                        ));
                    }
                    Ok(url)
                })
                .transpose()?,
            redirect_url: parse("redirect_url", &self.redirect_url)?,
            scopes: self.scopes.clone(),
            state_ttl: Duration::from_secs(self.state_ttl_secs.max(1)),
            refresh_margin: Duration::from_secs(self.refresh_margin_secs),
            confirm_url: self.confirm_url.clone(),
            http: network.settings(None, None, self.request_timeout_secs),
        })
    }
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            revocation_url: default_revocation_url(),
            redirect_url: default_redirect_url(),
            scopes: default_scopes(),
            state_ttl_secs: default_state_ttl_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            confirm_url: default_confirm_url(),
        }
    }
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_revocation_url() -> Option<String> {
    Some("https://oauth2.googleapis.com/revoke".to_string())
}

fn default_redirect_url() -> String {
    "http://localhost:8190/oauth2callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/calendar.readonly".to_string(),
        "https://www.googleapis.com/auth/calendar.calendarlist.readonly".to_string(),
    ]
}

fn default_state_ttl_secs() -> u64 {
    600
}

fn default_refresh_margin_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_confirm_url() -> String {
    "/admin/calendar/linked".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revocation_endpoint_must_be_https() {
        let network = NetworkDefaults::default();
        let mut cfg = OauthConfig::default();
        assert!(cfg.resolve(&network).expect("defaults").revocation_url.is_some());

        cfg.revocation_url = Some("http://127.0.0.1:9/revoke".to_string());
        assert!(matches!(
            cfg.resolve(&network),
            Err(AtelierError::InvalidConfiguration(_))
        ));

        cfg.revocation_url = None;
        assert!(cfg.resolve(&network).expect("no revocation").revocation_url.is_none());
    }
}
