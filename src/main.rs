use atelier::config::Config;
use atelier::server::{AtelierState, atelier_router};
use mimalloc::MiMalloc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load()?;

    // `atelier admin-token [ttl_secs]` prints a bearer token for the admin routes.
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("admin-token") {
        let ttl = match args.next() {
            Some(raw) => Duration::from_secs(raw.parse::<u64>()?),
            None => cfg.server.admin_token_ttl(),
        };
        let signer = atelier::signing::Signer::new(&cfg.server.signing_secret);
        println!("{}", signer.issue_admin_token(ttl)?);
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.server.log_filter.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.server.database_url,
        proxy = %cfg.network.proxy.as_ref().map_or("<none>", |u| u.as_str()),
        log_filter = %cfg.server.log_filter,
        listen = %cfg.server.listen,
        feed_sources = cfg.feeds.sources.len(),
        "Atelier starting"
    );

    let db = atelier::db::spawn(&cfg.server.database_url).await?;
    let core = atelier::Core::build(db, &cfg)?;

    let state = AtelierState::new(core);
    let app = atelier_router(state);

    let listener = TcpListener::bind(cfg.server.listen).await?;
    info!("HTTP server listening on {}", cfg.server.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
