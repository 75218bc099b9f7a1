use serde::{Deserialize, Serialize};
use url::Url;

use super::network::{HttpSettings, NetworkDefaults};
use crate::error::AtelierError;

/// Authenticated calendar API configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarConfig {
    /// Base URL of the calendar REST API.
    /// TOML: `calendar.api_url`. Default: `https://www.googleapis.com/calendar/v3/`.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// How far ahead busy time is read.
    /// TOML: `calendar.lookahead_days`. Default: `60`.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,

    /// Upper bound on followed `nextPageToken` pages per listing.
    /// TOML: `calendar.max_pages`. Default: `10`.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Per-call timeout against the calendar API.
    /// TOML: `calendar.request_timeout_secs`. Default: `15`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Falls back to `network.proxy` when unset.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Falls back to `network.enable_multiplexing` when unset.
    #[serde(default)]
    pub enable_multiplexing: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CalendarResolvedConfig {
    pub api_url: Url,
    pub lookahead: chrono::Duration,
    pub max_pages: usize,
    pub http: HttpSettings,
}

impl CalendarConfig {
    pub fn resolve(
        &self,
        network: &NetworkDefaults,
    ) -> Result<CalendarResolvedConfig, AtelierError> {
        let mut api_url = Url::parse(&self.api_url)
            .map_err(|e| AtelierError::invalid_config(format!("calendar.api_url: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(AtelierError::invalid_config(
                "calendar.api_url must be a hierarchical URL",
            ));
        }
        // Relative joins need a trailing slash.
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(CalendarResolvedConfig {
            api_url,
            lookahead: chrono::Duration::days(i64::from(self.lookahead_days.max(1))),
            max_pages: self.max_pages.max(1),
            http: network.settings(
                self.proxy.as_ref(),
                self.enable_multiplexing,
                self.request_timeout_secs,
            ),
        })
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            lookahead_days: default_lookahead_days(),
            max_pages: default_max_pages(),
            request_timeout_secs: default_request_timeout_secs(),
            proxy: None,
            enable_multiplexing: None,
        }
    }
}

fn default_api_url() -> String {
    "https://www.googleapis.com/calendar/v3/".to_string()
}

fn default_lookahead_days() -> u32 {
    60
}

fn default_max_pages() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    15
}
