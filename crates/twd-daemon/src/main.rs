//! twd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, assembles the
//! governor from config, spawns the background loops, and starts the HTTP
//! server. All route handlers live in `routes.rs`; shared state and the
//! loops live in `state.rs`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use chrono::NaiveTime;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use twd_audit::EventLog;
use twd_broker::DhanBroker;
use twd_daemon::{config::DaemonConfig, routes, state};
use twd_governor::Governor;
use twd_store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = DaemonConfig::from_env()?;
    let tick = Duration::from_secs(cfg.tick_secs);
    let session_open = cfg.governor.risk.session.open_time();

    let store = Arc::new(SqliteStore::open(&cfg.db_path).context("opening state db")?);
    let broker = Arc::new(
        DhanBroker::new(cfg.broker_base.clone(), cfg.access_token.clone())
            .context("building broker client")?,
    );
    let audit = match &cfg.audit_path {
        Some(path) => Some(EventLog::open(path, true).context("opening audit log")?),
        None => None,
    };

    // Boot honors whatever the store says: a day blocked yesterday evening
    // stays blocked until rollover or an operator call.
    let governor = Arc::new(Governor::boot(cfg.governor, broker, store, audit)?);
    let shared = Arc::new(state::AppState::new(Arc::clone(&governor), cfg.tick_secs));

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_evaluation_tick(Arc::clone(&shared), tick, stop_rx.clone());
    state::spawn_daily_trigger(
        Arc::clone(&shared),
        session_open,
        "session open",
        stop_rx.clone(),
    );
    // Past-midnight sweep so rollover does not wait for the first morning tick.
    state::spawn_daily_trigger(
        Arc::clone(&shared),
        NaiveTime::from_hms_opt(0, 5, 0).unwrap_or(NaiveTime::MIN),
        "rollover",
        stop_rx,
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("twd-daemon listening on http://{}", cfg.addr);

    axum::serve(tokio::net::TcpListener::bind(cfg.addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(stop_tx))
        .await
        .context("server crashed")?;

    Ok(())
}

async fn shutdown_signal(stop_tx: tokio::sync::watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, stopping loops");
    let _ = stop_tx.send(true);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
