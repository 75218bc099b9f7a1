use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Outbound HTTP defaults (used when a section-level value is unset).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkDefaults {
    /// Optional upstream HTTP proxy. If set, used for reqwest clients.
    /// TOML: `network.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Allow HTTP/2 multiplexing for reqwest clients; disabled forces HTTP/1.
    /// TOML: `network.enable_multiplexing`. Default: `false`.
    #[serde(default)]
    pub enable_multiplexing: bool,

    /// TCP connect timeout for every outbound call.
    /// TOML: `network.connect_timeout_secs`. Default: `5`.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for NetworkDefaults {
    fn default() -> Self {
        Self {
            proxy: None,
            enable_multiplexing: false,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Effective transport settings for one reqwest client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub proxy: Option<Url>,
    pub enable_multiplexing: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Maximum redirects to follow; `0` disables following.
    pub max_redirects: usize,
}

impl NetworkDefaults {
    pub(crate) fn settings(
        &self,
        proxy: Option<&Url>,
        enable_multiplexing: Option<bool>,
        request_timeout_secs: u64,
    ) -> HttpSettings {
        HttpSettings {
            proxy: proxy.cloned().or_else(|| self.proxy.clone()),
            enable_multiplexing: enable_multiplexing.unwrap_or(self.enable_multiplexing),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            max_redirects: 0,
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    5
}
