use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use super::network::{HttpSettings, NetworkDefaults};
use crate::error::AtelierError;

/// Published calendar links commonly bounce through a redirect or two.
const FEED_MAX_REDIRECTS: usize = 5;

/// One public calendar export (iCalendar) to read busy time from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeedSource {
    /// Stable label reported in source-failure annotations.
    pub name: String,

    pub url: Url,

    /// Artists this feed applies to. Empty means every artist.
    #[serde(default)]
    pub artists: Vec<i64>,
}

impl FeedSource {
    pub fn applies_to(&self, artist_id: i64) -> bool {
        self.artists.is_empty() || self.artists.contains(&artist_id)
    }
}

/// Public feed configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeedsConfig {
    /// IANA zone used for feed times that carry no zone information.
    /// TOML: `feeds.studio_timezone`. Default: `Europe/London`.
    #[serde(default = "default_studio_timezone")]
    pub studio_timezone: String,

    /// Per-feed fetch timeout.
    /// TOML: `feeds.request_timeout_secs`. Default: `10`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TOML: `[[feeds.sources]]`.
    #[serde(default)]
    pub sources: Vec<FeedSource>,

    /// Falls back to `network.proxy` when unset.
    #[serde(default)]
    pub proxy: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct FeedsResolvedConfig {
    pub studio_timezone: Tz,
    pub sources: Vec<FeedSource>,
    pub http: HttpSettings,
}

impl FeedsConfig {
    pub fn resolve(&self, network: &NetworkDefaults) -> Result<FeedsResolvedConfig, AtelierError> {
        let studio_timezone: Tz = self.studio_timezone.parse().map_err(|_| {
            AtelierError::invalid_config(format!(
                "feeds.studio_timezone: unknown time zone '{}'",
                self.studio_timezone
            ))
        })?;

        Ok(FeedsResolvedConfig {
            studio_timezone,
            sources: self.sources.clone(),
            http: HttpSettings {
                max_redirects: FEED_MAX_REDIRECTS,
                ..network.settings(self.proxy.as_ref(), None, self.request_timeout_secs)
            },
        })
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            studio_timezone: default_studio_timezone(),
            request_timeout_secs: default_request_timeout_secs(),
            sources: Vec::new(),
            proxy: None,
        }
    }
}

fn default_studio_timezone() -> String {
    "Europe/London".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}
