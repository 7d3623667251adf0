//! Axum router and all HTTP handlers for twd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! The handlers never mutate risk state themselves. Every write goes through
//! a `Governor` method, so the ordering guarantees live in one place.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::{
    api_types::{
        DayResponse, EmergencyRequest, EmergencyResponse, ErrorResponse, HealthResponse,
        LimitsEcho, OverrideRequest, RecordOrdersRequest, StatusResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/balance", get(balance))
        .route("/v1/stream", get(stream))
        .route("/v1/override", post(override_gate))
        .route("/v1/reset", post(reset))
        .route("/v1/emergency", post(emergency))
        .route("/v1/orders/record", post(record_orders))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let day = st.governor.snapshot().await;
    let cfg = st.governor.config();

    let resp = StatusResponse {
        service: st.build.service,
        version: st.build.version,
        uptime_secs: uptime_secs(),
        state: day.state_label().to_string(),
        limits: LimitsEcho {
            loss_fraction: cfg.risk.loss_fraction,
            max_orders: cfg.risk.max_orders,
            session_open: cfg.risk.session.open_hhmm(),
            session_close: cfg.risk.session.close_hhmm(),
            timezone: cfg.tz.to_string(),
            tick_secs: st.tick_secs,
        },
        day,
    };
    (StatusCode::OK, Json(resp))
}

// ---------------------------------------------------------------------------
// GET /v1/balance
// ---------------------------------------------------------------------------

/// Fetch a fresh balance from the broker right now. 503 when no endpoint
/// yields a usable number, so probes can distinguish "daemon up" from
/// "broker reachable".
pub(crate) async fn balance(State(st): State<Arc<AppState>>) -> Response {
    match st.governor.refresh_balance().await {
        Ok(reading) => (StatusCode::OK, Json(reading)).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/override
// ---------------------------------------------------------------------------

pub(crate) async fn override_gate(
    State(st): State<Arc<AppState>>,
    Json(req): Json<OverrideRequest>,
) -> impl IntoResponse {
    let allow = req.allow;
    let day = st.governor.force_override(allow, req.note).await;

    info!(allow, state = day.state_label(), "override applied");
    let _ = st.bus.send(BusMsg::State(day.clone()));
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: format!(
            "manual override: trading {}",
            if allow { "reopened" } else { "closed" }
        ),
    });

    (StatusCode::OK, Json(day_response(day)))
}

// ---------------------------------------------------------------------------
// POST /v1/reset
// ---------------------------------------------------------------------------

pub(crate) async fn reset(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let day = st.governor.force_reset().await;

    info!("manual reset applied");
    let _ = st.bus.send(BusMsg::State(day.clone()));
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: "manual reset: day record wiped".to_string(),
    });

    (StatusCode::OK, Json(day_response(day)))
}

// ---------------------------------------------------------------------------
// POST /v1/emergency
// ---------------------------------------------------------------------------

/// Run the unwind protocol immediately and close the gate. The body is
/// optional; a reason, when given, is carried into the audit trail.
pub(crate) async fn emergency(
    State(st): State<Arc<AppState>>,
    body: Option<Json<EmergencyRequest>>,
) -> impl IntoResponse {
    let reason = body.and_then(|Json(b)| b.reason);
    let (day, protocol) = st.governor.trigger_emergency(reason).await;

    let _ = st.bus.send(BusMsg::State(day.clone()));
    let _ = st.bus.send(BusMsg::LogLine {
        level: "ERROR".to_string(),
        msg: format!("emergency protocol run: {}", protocol.trigger),
    });

    (
        StatusCode::OK,
        Json(EmergencyResponse {
            state: day.state_label().to_string(),
            day,
            protocol,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/orders/record
// ---------------------------------------------------------------------------

/// Webhook for order placements the broker polling would see too late.
/// Adds to today's count; the ceiling is enforced on the next cycle.
pub(crate) async fn record_orders(
    State(st): State<Arc<AppState>>,
    body: Option<Json<RecordOrdersRequest>>,
) -> impl IntoResponse {
    let count = body.and_then(|Json(b)| b.count).unwrap_or(1);
    let day = st.governor.record_orders(count).await;

    let _ = st.bus.send(BusMsg::State(day.clone()));
    (StatusCode::OK, Json(day_response(day)))
}

fn day_response(day: twd_risk::DailyState) -> DayResponse {
    DayResponse {
        state: day.state_label().to_string(),
        day,
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::State(_) => "state",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
