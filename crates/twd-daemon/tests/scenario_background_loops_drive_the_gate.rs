//! Scenario: the background loops do the governing, no HTTP involved.
//!
//! # Invariants under test
//!
//! 1. `spawn_evaluation_tick` alone takes a fresh day through capture and,
//!    once the balance sinks past the ceiling, through the unwind and the
//!    gate close. Nothing calls the governor from the outside.
//!
//! 2. Changed cycles land on the event bus as `State` messages; a breach
//!    additionally produces an ERROR `LogLine`.
//!
//! 3. Flipping the shutdown watch stops the loop: the broker sees no
//!    further calls afterwards.
//!
//! 4. `spawn_heartbeat` emits on the bus without any subscriber prodding.
//!
//! The governor runs on the real wall clock here, so the tests use an
//! all-day session window instead of the NSE one.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use twd_daemon::state::{spawn_evaluation_tick, spawn_heartbeat, AppState, BusMsg};
use twd_governor::{Governor, GovernorConfig};
use twd_risk::{BlockReason, RiskConfig, SessionWindow};
use twd_store::SqliteStore;
use twd_testkit::StubBroker;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config whose session covers (almost) the whole day, so a cycle on the
/// real clock is in-session whenever these tests run.
fn all_day_config() -> GovernorConfig {
    let defaults = GovernorConfig::sane_defaults();
    GovernorConfig {
        risk: RiskConfig {
            session: SessionWindow::from_hhmm("00:00", "23:59").expect("window"),
            ..defaults.risk
        },
        ..defaults
    }
}

fn state_over(broker: Arc<StubBroker>) -> Arc<AppState> {
    let store = Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let gov =
        Governor::boot(all_day_config(), broker, store, None).expect("governor boot");
    Arc::new(AppState::new(Arc::new(gov), 30))
}

// ---------------------------------------------------------------------------
// 1 + 2. Tick loop captures, then unwinds and blocks; bus sees it all
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tick_loop_captures_then_blocks_on_a_breach() {
    let broker = Arc::new(StubBroker::new());
    broker.set_balance(100_000.0).await;

    let st = state_over(broker.clone());
    let mut bus = st.bus.subscribe();
    let (_stop_tx, stop_rx) = watch::channel(false);

    spawn_evaluation_tick(Arc::clone(&st), Duration::from_millis(10), stop_rx);

    // Enough intervals for the capture tick to land.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snap = st.governor.snapshot().await;
    assert_eq!(snap.morning_balance, Some(100_000.0));
    assert_eq!(snap.loss_ceiling, Some(20_000.0));
    assert!(snap.trading_allowed);

    // Now the account dives past the ceiling.
    broker.set_balance(79_000.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snap = st.governor.snapshot().await;
    assert!(!snap.trading_allowed);
    assert_eq!(snap.blocked_reason, Some(BlockReason::LossCeiling));
    assert!(snap.emergency_triggered);

    // The bus carried the story: at least one State message with the gate
    // closed, and an ERROR line for the breach.
    let mut saw_closed_state = false;
    let mut saw_breach_line = false;
    while let Ok(msg) = bus.try_recv() {
        match msg {
            BusMsg::State(day) if !day.trading_allowed => saw_closed_state = true,
            BusMsg::LogLine { level, msg } if level == "ERROR" => {
                assert!(msg.contains("loss ceiling breached"), "line: {msg}");
                saw_breach_line = true;
            }
            _ => {}
        }
    }
    assert!(saw_closed_state, "no State message with the gate closed");
    assert!(saw_breach_line, "no ERROR log line for the breach");
}

// ---------------------------------------------------------------------------
// 3. Shutdown stops the loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_watch_freezes_the_loop() {
    let broker = Arc::new(StubBroker::new());
    broker.set_balance(100_000.0).await;

    let st = state_over(broker.clone());
    let (stop_tx, stop_rx) = watch::channel(false);

    spawn_evaluation_tick(Arc::clone(&st), Duration::from_millis(10), stop_rx);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(broker.balance_calls().await > 0, "loop never ran");

    stop_tx.send(true).expect("watch send");
    tokio::time::sleep(Duration::from_millis(30)).await;

    let calls_at_stop = broker.balance_calls().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        broker.balance_calls().await,
        calls_at_stop,
        "loop kept polling after shutdown"
    );
}

// ---------------------------------------------------------------------------
// 4. Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_emits_on_the_bus() {
    let broker = Arc::new(StubBroker::new());
    let st = state_over(broker);
    let mut bus = st.bus.subscribe();

    spawn_heartbeat(st.bus.clone(), Duration::from_millis(10));

    let msg = tokio::time::timeout(Duration::from_secs(2), bus.recv())
        .await
        .expect("no heartbeat within 2s")
        .expect("bus closed");
    assert!(matches!(msg, BusMsg::Heartbeat { .. }));
}
