//! Scenario: Operator Actions
//!
//! # Invariants under test
//!
//! 1. A manual close sticks across in-session ticks; no market condition
//!    clears it.
//! 2. A manual reopen re-arms the automatic checks: a still-breached
//!    ceiling closes the gate again on the next cycle, unwinding again.
//! 3. Reset produces a fresh OPEN day with counters cleared.
//! 4. Webhook-recorded orders accumulate toward the ceiling; reaching it
//!    closes the gate without any cancel or exit call.
//! 5. The manual emergency trigger unwinds and blocks with the emergency
//!    reason even when no loss exists.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use twd_governor::{Governor, GovernorConfig};
use twd_risk::{BlockReason, DailyState};
use twd_store::{SqliteStore, StateStore};
use twd_testkit::{position, StubBroker};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn governor_over(broker: Arc<StubBroker>, store: Arc<SqliteStore>) -> Governor {
    store.save_day(&DailyState::fresh(day())).unwrap();
    Governor::boot(GovernorConfig::sane_defaults(), broker, store, None).unwrap()
}

#[tokio::test]
async fn manual_close_sticks_until_manually_reopened() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gov = governor_over(broker.clone(), store.clone());

    let day_record = gov
        .force_override(false, Some("maintenance".to_string()))
        .await;
    assert_eq!(day_record.blocked_reason, Some(BlockReason::Manual));

    broker.set_balance(100_000.0).await;
    let summary = gov.run_cycle_at(at(10, 0)).await;
    assert!(!summary.report.reopened);
    assert!(!summary.day.trading_allowed);

    let day_record = gov.force_override(true, None).await;
    assert!(day_record.trading_allowed);
    assert_eq!(day_record.blocked_reason, None);

    // The override is persisted, not just in memory.
    let stored = store.load_day(day()).unwrap().unwrap();
    assert!(stored.trading_allowed);
}

#[tokio::test]
async fn reopening_under_a_live_breach_unwinds_again() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gov = governor_over(broker.clone(), store);

    broker.set_balance(100_000.0).await;
    gov.run_cycle_at(at(9, 26)).await;

    broker
        .set_positions(vec![position("2885", "RELIANCE", 25)])
        .await;
    broker.set_balance(75_000.0).await;
    let summary = gov.run_cycle_at(at(10, 30)).await;
    assert!(summary.remediation.is_some());
    assert_eq!(broker.exits().await.len(), 1);

    // Operator forces the gate open while still under water.
    gov.force_override(true, Some("one more try".to_string()))
        .await;

    let summary = gov.run_cycle_at(at(10, 31)).await;
    assert!(
        summary.remediation.is_some(),
        "a forced reopen must not suppress the loss check"
    );
    assert_eq!(broker.exits().await.len(), 2);
    assert!(!summary.day.trading_allowed);
}

#[tokio::test]
async fn reset_clears_the_day_wholesale() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gov = governor_over(broker.clone(), store);

    broker.set_balance(100_000.0).await;
    gov.run_cycle_at(at(9, 26)).await;
    gov.record_orders(7).await;
    gov.force_override(false, None).await;

    let day_record = gov.force_reset().await;
    assert!(day_record.trading_allowed);
    assert_eq!(day_record.blocked_reason, None);
    assert_eq!(day_record.order_count, 0);
    assert!(day_record.morning_balance.is_none());
    assert!(!day_record.emergency_triggered);
}

#[tokio::test]
async fn webhook_orders_reach_the_ceiling_without_an_unwind() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gov = governor_over(broker.clone(), store);

    broker.set_balance(100_000.0).await;
    broker
        .set_positions(vec![position("2885", "RELIANCE", 25)])
        .await;

    let day_record = gov.record_orders(9).await;
    assert_eq!(day_record.order_count, 9);
    assert!(
        day_record.trading_allowed,
        "bookkeeping alone must not close the gate"
    );

    let summary = gov.run_cycle_at(at(10, 0)).await;
    assert!(summary.day.trading_allowed, "nine orders is under the ceiling");

    gov.record_orders(1).await;
    let summary = gov.run_cycle_at(at(10, 1)).await;
    assert!(!summary.day.trading_allowed);
    assert_eq!(summary.day.blocked_reason, Some(BlockReason::OrderCeiling));
    assert!(summary.remediation.is_none());
    assert!(broker.exits().await.is_empty(), "soft stop never unwinds");
    assert!(broker.cancelled().await.is_empty());
}

#[tokio::test]
async fn manual_emergency_unwinds_and_blocks_without_a_loss() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let gov = governor_over(broker.clone(), store.clone());

    broker.set_balance(100_000.0).await;
    broker
        .set_positions(vec![position("11536", "TCS", -10)])
        .await;

    let (day_record, outcome) = gov
        .trigger_emergency(Some("fat finger".to_string()))
        .await;

    assert_eq!(outcome.trigger, "fat finger");
    assert_eq!(outcome.positions_exited, 1);
    assert!(!day_record.trading_allowed);
    assert_eq!(day_record.blocked_reason, Some(BlockReason::Emergency));
    assert!(day_record.emergency_triggered);

    let stored = store.load_day(day()).unwrap().unwrap();
    assert_eq!(stored.blocked_reason, Some(BlockReason::Emergency));
}
