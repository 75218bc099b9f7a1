use crate::config::OauthResolvedConfig;
use crate::credentials::TokenGrant;
use crate::db::DbCredential;
use crate::error::{AtelierError, IsRetryable, OauthError};
use crate::http::build_http_client;
use axum::http::StatusCode;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, TimeDelta, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AccessToken, AuthUrl, AuthorizationCode, ClientId, ClientSecret, ConfigurationError, CsrfToken,
    EndpointMaybeSet, EndpointNotSet, EndpointSet, HttpRequest, HttpResponse, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RevocationUrl, Scope, StandardRevocableToken,
    TokenResponse, TokenUrl,
};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 60 * 60;

/// Upper bound on a granted lifetime; larger values are provider bugs.
const MAX_LIFETIME_SECS: i64 = 366 * 24 * 60 * 60;

type ProviderClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointMaybeSet, EndpointSet>;

/// Token-endpoint calls for the calendar provider.
///
/// Holds its own timeout-bounded `reqwest::Client`; code exchange is never
/// retried, refresh is retried on transport errors and 429/5xx only.
pub struct OauthEndpoints {
    client: ProviderClient,
    http: reqwest::Client,
    scopes: Vec<String>,
    retry_policy: ExponentialBuilder,
}

impl OauthEndpoints {
    pub fn new(cfg: &OauthResolvedConfig) -> Result<Self, AtelierError> {
        let mut client = BasicClient::new(ClientId::new(cfg.client_id.clone()))
            .set_auth_uri(AuthUrl::from_url(cfg.auth_url.clone()))
            .set_token_uri(TokenUrl::from_url(cfg.token_url.clone()))
            .set_redirect_uri(RedirectUrl::from_url(cfg.redirect_url.clone()))
            .set_revocation_url_option(cfg.revocation_url.clone().map(RevocationUrl::from_url));
        if !cfg.client_secret.is_empty() {
            client = client.set_client_secret(ClientSecret::new(cfg.client_secret.clone()));
        }

        Ok(Self {
            client,
            http: build_http_client(&cfg.http)?,
            scopes: cfg.scopes.clone(),
            retry_policy: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(400))
                .with_max_times(2)
                .with_jitter(),
        })
    }

    /// Consent URL: offline access, forced consent (so a refresh token is issued),
    /// PKCE, and the caller's signed state.
    pub fn authorize_url(&self, state: String, pkce_challenge: PkceCodeChallenge) -> Url {
        let mut req = self
            .client
            .authorize_url(|| CsrfToken::new(state))
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");

        for scope in &self.scopes {
            req = req.add_scope(Scope::new(scope.clone()));
        }

        req.url().0
    }

    /// Exchange an authorization code (PKCE) for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: Option<PkceCodeVerifier>,
    ) -> Result<BasicTokenResponse, OauthError> {
        let mut req = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = verifier {
            req = req.set_pkce_verifier(verifier);
        }
        let send = |request: HttpRequest| send_checked(self.http.clone(), request);
        let token = req.request_async(&send).await?;
        debug!("OAuth2 code exchange completed");
        Ok(token)
    }

    /// Refresh the access token, retrying transient failures.
    pub async fn refresh(&self, refresh_token: &str) -> Result<BasicTokenResponse, OauthError> {
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let send = |request: HttpRequest| send_checked(self.http.clone(), request);
        (|| async {
            self.client
                .exchange_refresh_token(&refresh_token)
                .request_async(&send)
                .await
                .map_err(OauthError::from)
        })
        .retry(self.retry_policy)
        .when(|e: &OauthError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(error = %err, sleep = ?dur, "OAuth2 refresh retrying");
        })
        .await
    }

    /// Best-effort RFC 7009 revocation. Failures are logged, never surfaced.
    pub async fn revoke(&self, token: StandardRevocableToken) {
        let request = match self.client.revoke_token(token) {
            Ok(request) => request,
            Err(ConfigurationError::MissingUrl(_)) => return,
            Err(e) => {
                warn!(error = %e, "token revocation skipped");
                return;
            }
        };
        let send = |request: HttpRequest| send_checked(self.http.clone(), request);
        match request.request_async(&send).await {
            Ok(()) => debug!("token revoked at provider"),
            Err(e) => warn!(error = %e, "token revocation failed"),
        }
    }

    /// Map a token response to a persistable grant.
    ///
    /// Missing `expires_in` defaults to one hour and absurd values are capped;
    /// missing `scope` falls back to the scopes we asked for.
    pub fn grant_from(&self, token: &BasicTokenResponse, now: DateTime<Utc>) -> TokenGrant {
        let lifetime = token
            .expires_in()
            .map_or(Ok(TimeDelta::seconds(DEFAULT_LIFETIME_SECS)), TimeDelta::from_std)
            .unwrap_or(TimeDelta::seconds(MAX_LIFETIME_SECS))
            .min(TimeDelta::seconds(MAX_LIFETIME_SECS));

        let scope = token
            .scopes()
            .filter(|s| !s.is_empty())
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_else(|| self.scopes.join(" "));

        TokenGrant {
            access_token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|rt| rt.secret().to_string()),
            expiry: now.checked_add_signed(lifetime).unwrap_or(now),
            scope,
        }
    }
}

/// Prefer the refresh token: revoking it ends the whole grant.
pub(crate) fn revocable_token(cred: DbCredential) -> StandardRevocableToken {
    match cred.refresh_token {
        Some(rt) => StandardRevocableToken::RefreshToken(RefreshToken::new(rt)),
        None => StandardRevocableToken::AccessToken(AccessToken::new(cred.access_token)),
    }
}

/// Sends an oauth2 request, turning 429 and 5xx into `UpstreamStatus` before
/// oauth2 tries to parse the body.
async fn send_checked(
    http: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, OauthError> {
    let resp = http.execute(reqwest::Request::try_from(request)?).await?;

    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(OauthError::UpstreamStatus(status));
    }

    let mut builder = oauth2::http::Response::builder()
        .status(status)
        .version(resp.version());
    for (name, value) in resp.headers() {
        builder = builder.header(name, value);
    }
    let body = resp.bytes().await?.to_vec();
    builder.body(body).map_err(|e| OauthError::Other {
        message: format!("rebuilding token endpoint response: {e}"),
    })
}
