//! Scenario: a dead database demotes persistence, not governing. The
//! in-memory day keeps transitioning, cycles keep running, and every
//! summary reports `persisted: false` so the operator can see it.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use twd_governor::{Governor, GovernorConfig};
use twd_risk::{BlockReason, DailyState};
use twd_store::StateStore;
use twd_testkit::StubBroker;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

/// Store whose reads work once (the boot image) and whose writes always fail.
struct WedgedStore;

impl StateStore for WedgedStore {
    fn load_day(&self, _date: NaiveDate) -> Result<Option<DailyState>> {
        Ok(None)
    }

    fn load_latest(&self) -> Result<Option<DailyState>> {
        Ok(Some(DailyState::fresh(day())))
    }

    fn save_day(&self, _day: &DailyState) -> Result<()> {
        Err(anyhow!("database file is wedged"))
    }
}

#[tokio::test]
async fn cycles_survive_a_wedged_store() {
    let broker = Arc::new(StubBroker::new());
    broker.set_balance(100_000.0).await;
    let gov = Governor::boot(
        GovernorConfig::sane_defaults(),
        broker.clone(),
        Arc::new(WedgedStore),
        None,
    )
    .unwrap();

    let summary = gov.run_cycle_at(at(9, 26)).await;
    assert!(summary.report.captured_morning);
    assert!(!summary.persisted);

    // The in-memory day still carries the capture forward.
    broker.set_balance(79_000.0).await;
    let summary = gov.run_cycle_at(at(10, 0)).await;
    assert!(!summary.persisted);
    assert!(summary.remediation.is_some());
    assert_eq!(summary.day.blocked_reason, Some(BlockReason::LossCeiling));

    // And the published snapshot matches what the cycle decided.
    let snap = gov.snapshot().await;
    assert!(!snap.trading_allowed);
    assert_eq!(snap.morning_balance, Some(100_000.0));
}

#[tokio::test]
async fn manual_actions_report_the_failed_write_too() {
    let gov = Governor::boot(
        GovernorConfig::sane_defaults(),
        Arc::new(StubBroker::new()),
        Arc::new(WedgedStore),
        None,
    )
    .unwrap();

    // Override still flips the in-memory gate even though the write fails.
    let day_after = gov.force_override(false, Some("drill".to_string())).await;
    assert_eq!(day_after.blocked_reason, Some(BlockReason::Manual));
    assert!(!gov.snapshot().await.trading_allowed);
}
