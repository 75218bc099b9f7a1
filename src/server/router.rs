use crate::bootstrap::Core;
use crate::server::guards::admin::{AdminGate, RequireAdmin, SignedTokenGate};
use crate::server::routes::{busy, calendars, oauth, quote};
use axum::{
    Router,
    extract::Request,
    http::{
        HeaderValue, StatusCode, Version,
        header::{HeaderName, USER_AGENT},
    },
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
};
use base64::Engine as _;
use rand::RngCore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

#[derive(Clone)]
pub struct AtelierState {
    pub core: Core,
    pub admin: Arc<dyn AdminGate>,
}

impl AtelierState {
    /// Admin routes accept bearer tokens signed with the configured secret.
    pub fn new(core: Core) -> Self {
        let admin = Arc::new(SignedTokenGate::new(core.signer.clone()));
        Self { core, admin }
    }

    pub fn with_admin_gate(core: Core, admin: Arc<dyn AdminGate>) -> Self {
        Self { core, admin }
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(generate_request_id, str::to_string);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    // Always reflect `x-request-id`, even if the client didn't send one.
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis();
    let path = uri.path();
    let protocol = format_http_version(version);

    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    }

    resp
}

pub fn atelier_router(state: AtelierState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/artists/{artist_id}/calendar/auth",
            get(oauth::oauth_entry),
        )
        .route(
            "/admin/artists/{artist_id}/calendars",
            get(calendars::list_calendars),
        )
        .route(
            "/admin/artists/{artist_id}/calendar",
            delete(calendars::unlink_calendar),
        )
        .route(
            "/admin/calendar/primary",
            put(calendars::set_primary_calendar),
        )
        .layer(middleware::from_extractor_with_state::<RequireAdmin, _>(
            state.clone(),
        ));

    let public = Router::new()
        // Provider redirects here; the signed state is the credential.
        .route("/oauth2callback", get(oauth::oauth_callback))
        .route("/quote", post(quote::quote_handler))
        .route("/artists/{artist_id}/busy", get(busy::busy_handler));

    Router::new()
        .merge(admin)
        .merge(public)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
