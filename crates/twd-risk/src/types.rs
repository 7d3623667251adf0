use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionWindow;

/// Why the trading gate is closed. Exactly one reason is stored at a time;
/// the first check that fires in a cycle wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Local time is outside the session window. The only reason that
    /// auto-clears when the window reopens.
    OutsideHours,
    /// Daily loss reached the ceiling; the emergency unwind ran.
    LossCeiling,
    /// Daily order count reached the ceiling. Soft stop, no unwind.
    OrderCeiling,
    /// Operator forced the gate closed.
    Manual,
    /// Operator invoked the emergency protocol directly.
    Emergency,
}

impl BlockReason {
    pub fn as_text(&self) -> &'static str {
        match self {
            BlockReason::OutsideHours => "outside trading hours",
            BlockReason::LossCeiling => "loss ceiling breached",
            BlockReason::OrderCeiling => "order ceiling reached",
            BlockReason::Manual => "manual override",
            BlockReason::Emergency => "emergency protocol triggered",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_text())
    }
}

/// Governor thresholds + session window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskConfig {
    /// Loss ceiling as a fraction of the morning balance.
    pub loss_fraction: f64,

    /// Daily order ceiling. Reaching it closes the gate without unwinding.
    pub max_orders: u32,

    /// Inclusive intraday trading window, exchange-local wall clock.
    pub session: SessionWindow,
}

impl RiskConfig {
    pub fn sane_defaults() -> Self {
        Self {
            loss_fraction: 0.20,
            max_orders: 10,
            session: SessionWindow::nse_intraday(),
        }
    }
}

/// Inputs for one evaluation cycle. The runtime provides the clock and the
/// readings; `None` means the broker had nothing usable this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickInput {
    /// Exchange-local wall clock at the start of the cycle.
    pub now_local: NaiveDateTime,

    /// Resolved account balance, if one was obtained this tick.
    pub balance: Option<f64>,

    /// Count of today's orders observed at the broker, if the order book
    /// was readable this tick.
    pub orders_today: Option<u32>,
}

/// Evidence behind a loss-ceiling breach, for remediation and audit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossBreach {
    pub morning: f64,
    pub current: f64,
    pub ceiling: f64,
    pub loss: f64,
}

/// What one evaluation cycle did to the state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CycleReport {
    /// A stale record was replaced; nothing else ran this tick.
    pub rolled_over: bool,

    /// The hours gate reopened the day (was `BLOCKED_HOURS`, now inside).
    pub reopened: bool,

    /// Morning balance was captured and the loss ceiling derived.
    pub captured_morning: bool,

    /// The gate closed this cycle, and why.
    pub blocked: Option<BlockReason>,

    /// Loss ceiling breached from an open gate: the caller must run the
    /// emergency protocol, then close the gate with `LossCeiling`.
    pub emergency: Option<LossBreach>,
}

impl CycleReport {
    /// True when the cycle changed anything worth announcing.
    pub fn changed(&self) -> bool {
        self.rolled_over
            || self.reopened
            || self.captured_morning
            || self.blocked.is_some()
            || self.emergency.is_some()
    }
}

/// The persisted record of one trading day. One row per date; the active
/// record is the one whose `date` is today in the exchange timezone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyState {
    pub date: NaiveDate,

    /// Captured once near session open; baseline for the loss percentage.
    pub morning_balance: Option<f64>,

    /// `morning_balance * loss_fraction`, fixed at capture time. Never
    /// recomputed from later readings.
    pub loss_ceiling: Option<f64>,

    /// Most recent successful reading. Advisory; gating always uses a
    /// fresh read.
    pub current_balance: Option<f64>,

    /// Orders attributed to this account today. Ratchets upward only.
    pub order_count: u32,

    /// The single authoritative gate consulted before any order placement.
    pub trading_allowed: bool,

    /// Present iff `trading_allowed` is false.
    pub blocked_reason: Option<BlockReason>,

    /// True once the emergency protocol has run today. Cleared only by day
    /// rollover or an explicit reset.
    pub emergency_triggered: bool,

    /// Timestamp of the most recent evaluation cycle.
    pub last_check: Option<DateTime<Utc>>,
}

impl DailyState {
    pub fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            morning_balance: None,
            loss_ceiling: None,
            current_balance: None,
            order_count: 0,
            trading_allowed: true,
            blocked_reason: None,
            emergency_triggered: false,
            last_check: None,
        }
    }

    /// Close the gate. Keeps the pair of fields in lockstep so the
    /// "closed implies a reason" invariant cannot drift.
    pub fn block(&mut self, reason: BlockReason) {
        self.trading_allowed = false;
        self.blocked_reason = Some(reason);
    }

    /// Open the gate and clear the reason. `emergency_triggered` is left
    /// alone: it records that remediation ran today, not the gate position.
    pub fn reopen(&mut self) {
        self.trading_allowed = true;
        self.blocked_reason = None;
    }

    pub fn is_blocked_by(&self, reason: BlockReason) -> bool {
        !self.trading_allowed && self.blocked_reason == Some(reason)
    }

    /// Dashboard label: "open" | "blocked_hours" | "blocked_loss" |
    /// "blocked_orders" | "blocked_manual" | "blocked_emergency".
    pub fn state_label(&self) -> &'static str {
        if self.trading_allowed {
            return "open";
        }
        match self.blocked_reason {
            Some(BlockReason::OutsideHours) => "blocked_hours",
            Some(BlockReason::LossCeiling) => "blocked_loss",
            Some(BlockReason::OrderCeiling) => "blocked_orders",
            Some(BlockReason::Manual) => "blocked_manual",
            Some(BlockReason::Emergency) => "blocked_emergency",
            None => "blocked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
    }

    #[test]
    fn fresh_state_is_open_with_no_reason() {
        let st = DailyState::fresh(day());
        assert!(st.trading_allowed);
        assert_eq!(st.blocked_reason, None);
        assert_eq!(st.order_count, 0);
        assert!(!st.emergency_triggered);
        assert_eq!(st.state_label(), "open");
    }

    #[test]
    fn block_and_reopen_keep_flag_and_reason_in_lockstep() {
        let mut st = DailyState::fresh(day());
        st.block(BlockReason::Manual);
        assert!(!st.trading_allowed);
        assert_eq!(st.blocked_reason, Some(BlockReason::Manual));
        assert_eq!(st.state_label(), "blocked_manual");

        st.reopen();
        assert!(st.trading_allowed);
        assert_eq!(st.blocked_reason, None);
    }

    #[test]
    fn reopen_preserves_emergency_marker() {
        let mut st = DailyState::fresh(day());
        st.block(BlockReason::LossCeiling);
        st.emergency_triggered = true;
        st.reopen();
        assert!(st.emergency_triggered, "reopen must not erase remediation history");
    }
}
