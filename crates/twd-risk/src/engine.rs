use crate::{BlockReason, CycleReport, DailyState, LossBreach, RiskConfig, TickInput};

/// One full evaluation pass over the day's state.
///
/// Checks run in a fixed order (rollover, hours gate, morning capture,
/// loss check, order ceiling) and the first one that closes the gate wins
/// the stored reason. The function mutates `st` in place and reports what
/// happened; the caller owns remediation and persistence.
pub fn evaluate_cycle(cfg: &RiskConfig, st: &mut DailyState, inp: &TickInput) -> CycleReport {
    let mut report = CycleReport::default();

    // 0) Reading sanity: a non-positive or non-finite balance is never
    //    evidence of anything (it would read as a total loss). The resolver
    //    upstream refuses these too; the guard here keeps a misbehaving
    //    gateway from corrupting the baseline.
    let balance = inp.balance.filter(|b| b.is_finite() && *b > 0.0);

    // 1) Day rollover: a stale record is replaced wholesale and the cycle
    //    stops. No check below may run against yesterday's counters.
    let today = inp.now_local.date();
    if st.date != today {
        *st = DailyState::fresh(today);
        report.rolled_over = true;
        return report;
    }

    // Advisory freshness: any good reading updates current_balance, gate
    // open or not.
    if let Some(current) = balance {
        st.current_balance = Some(current);
    }

    // 2) Trading-hours gate. Closing fires only from OPEN; reopening fires
    //    only when the stored reason is exactly OutsideHours. Every other
    //    reason is sticky across the session boundary.
    let in_session = cfg.session.contains(inp.now_local.time());
    if !in_session && st.trading_allowed {
        st.block(BlockReason::OutsideHours);
        report.blocked = Some(BlockReason::OutsideHours);
    } else if in_session && st.is_blocked_by(BlockReason::OutsideHours) {
        st.reopen();
        report.reopened = true;
    }

    // 3) Morning capture: inside the session, the first good reading of the
    //    day becomes the baseline and the ceiling is derived once, here. A
    //    tick without a reading leaves both unset; the next tick retries.
    if in_session && st.morning_balance.is_none() {
        if let Some(current) = balance {
            st.morning_balance = Some(current);
            st.loss_ceiling = Some(current * cfg.loss_fraction);
            report.captured_morning = true;
        }
    }

    // 4) Loss check: needs the baseline and a reading from this tick; a
    //    missing reading changes nothing. The directive fires only from
    //    OPEN, so one breach produces one directive until an operator
    //    reopens the gate. The gate itself is closed by the caller after
    //    remediation (protocol step 3). A zero ceiling means the loss check
    //    is disabled.
    if let (Some(morning), Some(ceiling)) = (st.morning_balance, st.loss_ceiling) {
        if let Some(current) = balance {
            let loss = morning - current;
            if ceiling > 0.0 && loss >= ceiling && st.trading_allowed {
                report.emergency = Some(LossBreach {
                    morning,
                    current,
                    ceiling,
                    loss,
                });
            }
        }
    }

    // 5) Order-count ceiling: the count only ratchets upward, whatever the
    //    broker reports. Reaching the ceiling is a soft stop (the gate
    //    closes, nothing is unwound) and it defers to a loss breach
    //    detected in the same cycle.
    if let Some(observed) = inp.orders_today {
        if observed > st.order_count {
            st.order_count = observed;
        }
    }
    if st.order_count >= cfg.max_orders && st.trading_allowed && report.emergency.is_none() {
        st.block(BlockReason::OrderCeiling);
        report.blocked = Some(BlockReason::OrderCeiling);
    }

    report
}
