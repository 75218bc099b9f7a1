use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::AtelierError;

/// Secrets shorter than this make the HMAC on `state` and admin tokens guessable.
const MIN_SIGNING_SECRET_LEN: usize = 16;

/// Listener, storage and signing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// TOML: `server.listen`. Default: `0.0.0.0:8190`.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// TOML: `server.database_url`. Default: `sqlite://atelier.db`.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    /// TOML: `server.log_filter`. Default: `info`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// HMAC key for OAuth `state` values and admin bearer tokens. No default.
    /// TOML: `server.signing_secret`.
    #[serde(default)]
    pub signing_secret: String,

    /// Lifetime of tokens minted by `atelier admin-token`.
    /// TOML: `server.admin_token_ttl_secs`. Default: `43200`.
    #[serde(default = "default_admin_token_ttl_secs")]
    pub admin_token_ttl_secs: u64,
}

impl ServerConfig {
    pub fn admin_token_ttl(&self) -> Duration {
        Duration::from_secs(self.admin_token_ttl_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), AtelierError> {
        let secret = self.signing_secret.trim();
        if secret.is_empty() {
            return Err(AtelierError::invalid_config(
                "server.signing_secret must be set",
            ));
        }
        if secret.len() < MIN_SIGNING_SECRET_LEN {
            return Err(AtelierError::invalid_config(format!(
                "server.signing_secret must be at least {MIN_SIGNING_SECRET_LEN} bytes"
            )));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database_url: default_database_url(),
            log_filter: default_log_filter(),
            signing_secret: String::new(),
            admin_token_ttl_secs: default_admin_token_ttl_secs(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8190))
}

fn default_database_url() -> String {
    "sqlite://atelier.db".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_admin_token_ttl_secs() -> u64 {
    12 * 60 * 60
}
