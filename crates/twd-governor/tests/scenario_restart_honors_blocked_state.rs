//! Scenario: Restart
//!
//! # Invariants under test
//!
//! 1. Boot reloads the most recent stored record; a BLOCKED day stays
//!    blocked across a process restart.
//! 2. In-session ticks after the restart do not reopen a loss block.
//! 3. Boot over an empty store starts a fresh OPEN day.
//!
//! Both governors share one in-memory store handle, standing in for the
//! database file surviving the restart.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use twd_governor::{Governor, GovernorConfig};
use twd_risk::{BlockReason, DailyState};
use twd_store::{SqliteStore, StateStore};
use twd_testkit::StubBroker;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn loss_block_survives_a_restart() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.save_day(&DailyState::fresh(day())).unwrap();

    // First process: capture, then breach.
    {
        let gov = Governor::boot(
            GovernorConfig::sane_defaults(),
            broker.clone(),
            store.clone(),
            None,
        )
        .unwrap();
        broker.set_balance(100_000.0).await;
        gov.run_cycle_at(at(9, 26)).await;
        broker.set_balance(78_000.0).await;
        let summary = gov.run_cycle_at(at(10, 30)).await;
        assert!(summary.remediation.is_some());
    }

    // Second process over the same store.
    let gov = Governor::boot(
        GovernorConfig::sane_defaults(),
        broker.clone(),
        store.clone(),
        None,
    )
    .unwrap();

    let day_record = gov.snapshot().await;
    assert!(!day_record.trading_allowed);
    assert_eq!(day_record.blocked_reason, Some(BlockReason::LossCeiling));
    assert!(day_record.emergency_triggered);
    assert_eq!(day_record.morning_balance, Some(100_000.0));

    // A recovered balance in-session still does not reopen it.
    broker.set_balance(120_000.0).await;
    let summary = gov.run_cycle_at(at(11, 0)).await;
    assert!(!summary.report.reopened);
    assert!(!summary.day.trading_allowed);
    assert!(summary.remediation.is_none());
}

#[tokio::test]
async fn empty_store_boots_a_fresh_open_day() {
    let broker = Arc::new(StubBroker::new());
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let gov = Governor::boot(GovernorConfig::sane_defaults(), broker, store, None).unwrap();

    let day_record = gov.snapshot().await;
    assert!(day_record.trading_allowed);
    assert_eq!(day_record.blocked_reason, None);
    assert_eq!(day_record.order_count, 0);
    assert!(day_record.morning_balance.is_none());
}
