mod calendar;
mod feeds;
mod network;
mod oauth;
mod server;

pub use calendar::{CalendarConfig, CalendarResolvedConfig};
pub use feeds::{FeedSource, FeedsConfig, FeedsResolvedConfig};
pub use network::{HttpSettings, NetworkDefaults};
pub use oauth::{OauthConfig, OauthResolvedConfig};
pub use server::ServerConfig;

use crate::error::AtelierError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Listener, database and signing key (see `server` table in config.toml).
    #[serde(default)]
    pub server: ServerConfig,

    /// Outbound HTTP defaults (see `network` table in config.toml).
    #[serde(default)]
    pub network: NetworkDefaults,

    /// Calendar-provider OAuth client (see `oauth` table in config.toml).
    #[serde(default)]
    pub oauth: OauthConfig,

    /// Authenticated calendar API (see `calendar` table in config.toml).
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Public iCalendar feeds (see `feeds` table in config.toml).
    #[serde(default)]
    pub feeds: FeedsConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "ATELIER_";

impl Config {
    /// Builds a Figment that merges defaults, an optional config TOML file and
    /// `ATELIER_`-prefixed environment variables (`__` separates nesting).
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration and validates required fields.
    pub fn load() -> Result<Self, AtelierError> {
        let cfg: Self = Self::figment()
            .extract()
            .map_err(|e| AtelierError::invalid_config(format!("failed to load config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AtelierError> {
        self.server.validate()?;
        // Surface zone/URL mistakes at startup rather than on first request.
        self.oauth()?;
        self.calendar()?;
        self.feeds()?;
        Ok(())
    }

    pub fn oauth(&self) -> Result<OauthResolvedConfig, AtelierError> {
        self.oauth.resolve(&self.network)
    }

    pub fn calendar(&self) -> Result<CalendarResolvedConfig, AtelierError> {
        self.calendar.resolve(&self.network)
    }

    pub fn feeds(&self) -> Result<FeedsResolvedConfig, AtelierError> {
        self.feeds.resolve(&self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_but_fail_validation_without_secret() {
        let cfg = Config::default();
        assert!(cfg.oauth().is_ok());
        assert!(cfg.calendar().is_ok());
        assert_eq!(
            cfg.feeds().expect("default feeds resolve").studio_timezone,
            chrono_tz::Europe::London
        );
        assert!(matches!(
            cfg.validate(),
            Err(AtelierError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let mut cfg = Config::default();
        cfg.server.signing_secret = "a-long-enough-secret".to_string();
        cfg.feeds.studio_timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(
            cfg.validate(),
            Err(AtelierError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn calendar_api_url_gets_trailing_slash() {
        let mut cfg = Config::default();
        cfg.calendar.api_url = "http://127.0.0.1:9/calendar/v3".to_string();
        let resolved = cfg.calendar().expect("resolves");
        assert_eq!(resolved.api_url.path(), "/calendar/v3/");
    }
}
