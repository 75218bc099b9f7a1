#![allow(dead_code)]

use atelier::Core;
use atelier::config::{Config, FeedSource};
use atelier::credentials::TokenGrant;
use atelier::db::ArtistCreate;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;
use url::Url;

pub const SIGNING_SECRET: &str = "test-signing-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Fresh access token, no refresh token in the response.
    Ok,
    /// Fresh access token and a rotated refresh token.
    Rotate,
    InvalidGrant,
    ServerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMode {
    Ok,
    OkWithoutRefreshToken,
    InvalidGrant,
}

#[derive(Debug)]
pub struct MockInner {
    pub refresh_mode: RefreshMode,
    pub refresh_delay: Duration,
    pub refresh_calls: usize,
    /// `expires_in` on successful refresh responses.
    pub refresh_expires_in: u64,
    /// The first this-many refresh calls answer 503 whatever the mode.
    pub refresh_outages: usize,
    pub code_mode: CodeMode,
    pub code_calls: usize,
    pub calendars: Value,
    pub events: Value,
    pub events_status: StatusCode,
    pub events_delay: Duration,
    pub event_requests: Vec<HashMap<String, String>>,
    pub bearer_tokens: Vec<String>,
    pub feeds: HashMap<String, (StatusCode, String)>,
}

impl Default for MockInner {
    fn default() -> Self {
        Self {
            refresh_mode: RefreshMode::Ok,
            refresh_delay: Duration::ZERO,
            refresh_calls: 0,
            refresh_expires_in: 3600,
            refresh_outages: 0,
            code_mode: CodeMode::Ok,
            code_calls: 0,
            calendars: json!({ "items": [] }),
            events: json!({ "items": [] }),
            events_status: StatusCode::OK,
            events_delay: Duration::ZERO,
            event_requests: Vec::new(),
            bearer_tokens: Vec::new(),
            feeds: HashMap::new(),
        }
    }
}

/// Stand-in for the OAuth provider, the calendar API and public feed hosts.
#[derive(Clone, Default)]
pub struct MockProvider {
    pub inner: Arc<Mutex<MockInner>>,
}

impl MockProvider {
    pub fn with<R>(&self, f: impl FnOnce(&mut MockInner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    pub fn refresh_calls(&self) -> usize {
        self.with(|m| m.refresh_calls)
    }

    pub fn set_feed(&self, name: &str, status: StatusCode, body: &str) {
        self.with(|m| m.feeds.insert(name.to_string(), (status, body.to_string())));
    }
}

async fn token_handler(State(mock): State<MockProvider>, body: Bytes) -> Response {
    let form: HashMap<String, String> = url::form_urlencoded::parse(&body).into_owned().collect();
    let grant_type = form.get("grant_type").map(String::as_str).unwrap_or("");

    match grant_type {
        "authorization_code" => {
            let mode = mock.with(|m| {
                m.code_calls += 1;
                m.code_mode
            });
            match mode {
                CodeMode::Ok => Json(json!({
                    "access_token": "access-from-code",
                    "token_type": "bearer",
                    "expires_in": 3600,
                    "refresh_token": "refresh-from-code",
                    "scope": "https://www.googleapis.com/auth/calendar.readonly"
                }))
                .into_response(),
                CodeMode::OkWithoutRefreshToken => Json(json!({
                    "access_token": "access-from-code",
                    "token_type": "bearer",
                    "expires_in": 3600
                }))
                .into_response(),
                CodeMode::InvalidGrant => invalid_grant(),
            }
        }
        "refresh_token" => {
            let (mode, delay, n, expires_in, outage) = mock.with(|m| {
                m.refresh_calls += 1;
                (
                    m.refresh_mode,
                    m.refresh_delay,
                    m.refresh_calls,
                    m.refresh_expires_in,
                    m.refresh_calls <= m.refresh_outages,
                )
            });
            tokio::time::sleep(delay).await;
            if outage {
                return (StatusCode::SERVICE_UNAVAILABLE, "try again later").into_response();
            }
            match mode {
                RefreshMode::Ok => Json(json!({
                    "access_token": format!("access-from-refresh-{n}"),
                    "token_type": "bearer",
                    "expires_in": expires_in
                }))
                .into_response(),
                RefreshMode::Rotate => Json(json!({
                    "access_token": format!("access-from-refresh-{n}"),
                    "token_type": "bearer",
                    "expires_in": expires_in,
                    "refresh_token": format!("rotated-refresh-{n}")
                }))
                .into_response(),
                RefreshMode::InvalidGrant => invalid_grant(),
                RefreshMode::ServerError => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response()
                }
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response(),
    }
}

fn invalid_grant() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })),
    )
        .into_response()
}

fn record_bearer(mock: &MockProvider, headers: &HeaderMap) {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        mock.with(|m| m.bearer_tokens.push(token.to_string()));
    }
}

async fn calendar_list_handler(State(mock): State<MockProvider>, headers: HeaderMap) -> Response {
    record_bearer(&mock, &headers);
    Json(mock.with(|m| m.calendars.clone())).into_response()
}

async fn events_handler(
    State(mock): State<MockProvider>,
    Path(calendar_id): Path<String>,
    headers: HeaderMap,
    axum::extract::Query(mut query): axum::extract::Query<HashMap<String, String>>,
) -> Response {
    record_bearer(&mock, &headers);
    query.insert("calendarId".to_string(), calendar_id);
    let (status, events, delay) = mock.with(|m| {
        m.event_requests.push(query);
        (m.events_status, m.events.clone(), m.events_delay)
    });
    tokio::time::sleep(delay).await;
    if status.is_success() {
        Json(events).into_response()
    } else {
        (status, Json(json!({ "error": { "code": status.as_u16() } }))).into_response()
    }
}

async fn feed_handler(State(mock): State<MockProvider>, Path(name): Path<String>) -> Response {
    match mock.with(|m| m.feeds.get(&name).cloned()) {
        Some((status, body)) => {
            (status, [(header::CONTENT_TYPE, "text/calendar")], body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn spawn_test_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{addr}")).expect("valid base url");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    base
}

pub async fn spawn_mock_provider() -> (MockProvider, Url) {
    let mock = MockProvider::default();
    let app = Router::new()
        .route("/token", post(token_handler))
        .route(
            "/calendar/v3/users/me/calendarList",
            get(calendar_list_handler),
        )
        .route(
            "/calendar/v3/calendars/{calendar_id}/events",
            get(events_handler),
        )
        .route("/feeds/{name}", get(feed_handler))
        .with_state(mock.clone());
    let base = spawn_test_server(app).await;
    (mock, base)
}

pub fn unique_sqlite_url(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "atelier-{prefix}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    format!("sqlite:{}", temp_path.display())
}

pub fn feed_source(base: &Url, name: &str) -> FeedSource {
    FeedSource {
        name: name.to_string(),
        url: base.join(&format!("feeds/{name}")).expect("feed url"),
        artists: Vec::new(),
    }
}

pub fn test_config(base: &Url, feeds: Vec<FeedSource>) -> Config {
    let mut cfg = Config::default();
    cfg.server.signing_secret = SIGNING_SECRET.to_string();
    cfg.oauth.client_id = "client-id".to_string();
    cfg.oauth.client_secret = "client-secret".to_string();
    cfg.oauth.auth_url = base.join("auth").expect("auth url").to_string();
    cfg.oauth.token_url = base.join("token").expect("token url").to_string();
    // Revocation requires https, which the loopback mock cannot offer.
    cfg.oauth.revocation_url = None;
    cfg.oauth.redirect_url = "http://localhost:8190/oauth2callback".to_string();
    cfg.oauth.confirm_url = "/admin/calendar/linked".to_string();
    cfg.oauth.request_timeout_secs = 5;
    cfg.calendar.api_url = base.join("calendar/v3").expect("api url").to_string();
    cfg.calendar.request_timeout_secs = 2;
    cfg.feeds.request_timeout_secs = 2;
    cfg.feeds.sources = feeds;
    cfg
}

pub async fn build_core(prefix: &str, cfg: &Config) -> Core {
    let db = atelier::db::spawn(&unique_sqlite_url(prefix))
        .await
        .expect("spawn db actor");
    Core::build(db, cfg).expect("build core")
}

pub async fn create_artist(core: &Core, name: &str) -> i64 {
    core.db
        .create_artist(ArtistCreate {
            name: name.to_string(),
            linked_calendar_id: None,
        })
        .await
        .expect("create artist")
}

/// Store a credential expiring `expires_in` from now (negative = already expired).
pub async fn seed_credential(core: &Core, artist_id: i64, expires_in: TimeDelta) -> i64 {
    core.credentials
        .save(
            artist_id,
            TokenGrant {
                access_token: "seeded-access".to_string(),
                refresh_token: Some("seeded-refresh".to_string()),
                expiry: Utc::now() + expires_in,
                scope: "https://www.googleapis.com/auth/calendar.readonly".to_string(),
            },
        )
        .await
        .expect("seed credential")
}

pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
