use crate::config::HttpSettings;
use crate::error::AtelierError;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use std::time::Duration;

pub const ATELIER_USER_AGENT: &str = concat!("atelier/", env!("CARGO_PKG_VERSION"));

/// Preview length for upstream bodies quoted in errors and logs.
pub(crate) const UPSTREAM_BODY_PREVIEW_CHARS: usize = 200;

/// Build a reqwest client whose every call is bounded by the configured timeouts.
///
/// Redirects are only followed when the settings allow it.
pub fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client, AtelierError> {
    let mut headers = HeaderMap::new();

    let mut builder = reqwest::Client::builder()
        .user_agent(ATELIER_USER_AGENT)
        .redirect(redirect_policy(settings.max_redirects))
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout);

    if let Some(proxy_url) = settings.proxy.as_ref() {
        let proxy = reqwest::Proxy::all(proxy_url.as_str())
            .map_err(|e| AtelierError::invalid_config(format!("invalid proxy url: {e}")))?;
        builder = builder.proxy(proxy);
    }

    if settings.enable_multiplexing {
        builder = builder.http2_adaptive_window(true);
    } else {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        builder = builder
            .http1_only()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0));
    }

    Ok(builder.default_headers(headers).build()?)
}

fn redirect_policy(max_redirects: usize) -> reqwest::redirect::Policy {
    if max_redirects == 0 {
        reqwest::redirect::Policy::none()
    } else {
        reqwest::redirect::Policy::limited(max_redirects)
    }
}

/// Truncate an upstream body for inclusion in an error message.
pub(crate) fn body_preview(raw: &str) -> String {
    format!("{raw:.len$}", len = UPSTREAM_BODY_PREVIEW_CHARS)
}
