//! Shared runtime state and background loops for twd-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; the spawn functions own the loops that
//! actually drive the governor, so the HTTP surface stays read-and-command.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use twd_governor::{CycleSummary, Governor};
use twd_risk::DailyState;

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    State(DailyState),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// The one governor every route and loop talks to.
    pub governor: Arc<Governor>,
    /// Evaluation cadence, echoed by the status route.
    pub tick_secs: u64,
}

impl AppState {
    pub fn new(governor: Arc<Governor>, tick_secs: u64) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        Self {
            bus,
            build: BuildInfo {
                service: "twd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            governor,
            tick_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn the periodic evaluation loop.
///
/// Every `interval` the governor runs one full cycle (fetch, evaluate,
/// remediate, persist). Only cycles that changed something are announced
/// on the bus. Flipping `shutdown` to `true` ends the loop.
pub fn spawn_evaluation_tick(
    state: Arc<AppState>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = state.governor.run_cycle().await;
                    if summary.report.changed() {
                        announce(&state, &summary);
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("evaluation loop stopped");
                        return;
                    }
                }
            }
        }
    });
}

/// Spawn a task that runs one extra governor cycle at a fixed exchange-local
/// wall time every day. One instance covers the session-open sweep, another
/// the past-midnight rollover, so neither depends on tick cadence alone.
pub fn spawn_daily_trigger(
    state: Arc<AppState>,
    at: NaiveTime,
    label: &'static str,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            let now = Utc::now().with_timezone(&state.governor.config().tz).time();
            let wait = Duration::from_secs(secs_until(now, at));
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    info!(label, "daily trigger fired");
                    let summary = state.governor.run_cycle().await;
                    if summary.report.changed() {
                        announce(&state, &summary);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });
}

/// Put a changed cycle on the bus: the new day record, plus a log line for
/// anything an operator would want in a dashboard feed.
fn announce(state: &AppState, summary: &CycleSummary) {
    let _ = state.bus.send(BusMsg::State(summary.day.clone()));

    if summary.report.rolled_over {
        let _ = state.bus.send(BusMsg::LogLine {
            level: "INFO".to_string(),
            msg: format!("new trading day started: {}", summary.day.date),
        });
    }
    if summary.report.reopened {
        let _ = state.bus.send(BusMsg::LogLine {
            level: "INFO".to_string(),
            msg: "session window open, trading resumed".to_string(),
        });
    }
    if let Some(reason) = summary.report.blocked {
        warn!(reason = reason.as_text(), "gate closed");
        let _ = state.bus.send(BusMsg::LogLine {
            level: "WARN".to_string(),
            msg: format!("trading blocked: {reason}"),
        });
    }
    if let Some(breach) = &summary.report.emergency {
        let _ = state.bus.send(BusMsg::LogLine {
            level: "ERROR".to_string(),
            msg: format!(
                "loss ceiling breached: down {:.2} against a ceiling of {:.2}",
                breach.loss, breach.ceiling
            ),
        });
    }
}

/// Seconds from `now` to the next daily occurrence of `at`. Never zero; a
/// call exactly on the mark waits a full day so the trigger cannot spin.
fn secs_until(now: NaiveTime, at: NaiveTime) -> u64 {
    let diff =
        at.num_seconds_from_midnight() as i64 - now.num_seconds_from_midnight() as i64;
    let wrapped = diff.rem_euclid(86_400);
    if wrapped == 0 {
        86_400
    } else {
        wrapped as u64
    }
}
