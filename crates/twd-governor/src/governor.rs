use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use twd_audit::EventLog;
use twd_broker::{BrokerApi, BrokerError};
use twd_risk::{evaluate_cycle, BlockReason, CycleReport, DailyState, RiskConfig, TickInput};
use twd_schemas::BalanceReading;
use twd_store::StateStore;

use crate::emergency::{run_protocol, EmergencyReport};

#[derive(Clone, Debug)]
pub struct GovernorConfig {
    pub risk: RiskConfig,
    /// Exchange timezone; the day boundary and session window live here.
    pub tz: Tz,
}

impl GovernorConfig {
    pub fn sane_defaults() -> Self {
        Self {
            risk: RiskConfig::sane_defaults(),
            tz: chrono_tz::Asia::Kolkata,
        }
    }
}

/// Everything one evaluation cycle did, for callers that announce or test.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub day: DailyState,
    pub report: CycleReport,
    pub remediation: Option<EmergencyReport>,
    pub persisted: bool,
}

/// Owns the authoritative day record.
///
/// `state` is the single writer lock: every mutation (cycle, override,
/// reset, webhook) runs under it as one read-modify-write unit and
/// persists the whole record before releasing. `published` mirrors the
/// record for lock-cheap reads.
pub struct Governor {
    cfg: GovernorConfig,
    broker: Arc<dyn BrokerApi>,
    store: Arc<dyn StateStore>,
    state: Mutex<DailyState>,
    published: RwLock<DailyState>,
    audit_log: Option<Mutex<EventLog>>,
}

impl Governor {
    /// Reload the most recent record, or start fresh when the store is
    /// empty. A BLOCKED record is honored as-is at boot; only the rollover
    /// check or an operator may produce an open day from it.
    pub fn boot(
        cfg: GovernorConfig,
        broker: Arc<dyn BrokerApi>,
        store: Arc<dyn StateStore>,
        audit: Option<EventLog>,
    ) -> Result<Self> {
        let day = match store.load_latest()? {
            Some(day) => day,
            None => {
                let today = Utc::now().with_timezone(&cfg.tz).date_naive();
                DailyState::fresh(today)
            }
        };
        info!(date = %day.date, state = day.state_label(), "governor booted");

        Ok(Self {
            cfg,
            broker,
            store,
            published: RwLock::new(day.clone()),
            state: Mutex::new(day),
            audit_log: audit.map(Mutex::new),
        })
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.cfg
    }

    /// Cheap read of the last published day record.
    pub async fn snapshot(&self) -> DailyState {
        self.published.read().await.clone()
    }

    /// One evaluation cycle at the current exchange-local wall clock.
    pub async fn run_cycle(&self) -> CycleSummary {
        let now_local = Utc::now().with_timezone(&self.cfg.tz).naive_local();
        self.run_cycle_at(now_local).await
    }

    /// One evaluation cycle at an explicit local time. The state lock is
    /// held for the whole pass: fetch, evaluate, remediate, persist form
    /// one atomic unit against concurrent operator actions.
    pub async fn run_cycle_at(&self, now_local: NaiveDateTime) -> CycleSummary {
        let mut st = self.state.lock().await;

        // A stale record rolls over without consulting the broker, so the
        // fetches are skipped entirely on that tick.
        let (balance, orders_today) = if st.date != now_local.date() {
            (None, None)
        } else {
            self.fetch_truth().await
        };

        let input = TickInput {
            now_local,
            balance,
            orders_today,
        };
        let report = evaluate_cycle(&self.cfg.risk, &mut st, &input);
        self.note_transitions(&st, &report).await;

        // Loss breach: unwind first, then close the gate. Gate closure does
        // not depend on how much of the unwind succeeded.
        let mut remediation = None;
        if let Some(breach) = report.emergency {
            warn!(
                morning = breach.morning,
                current = breach.current,
                loss = breach.loss,
                ceiling = breach.ceiling,
                "loss ceiling breached; running emergency protocol"
            );
            let outcome =
                run_protocol(self.broker.as_ref(), BlockReason::LossCeiling.as_text()).await;
            self.audit_protocol(&outcome).await;
            st.block(BlockReason::LossCeiling);
            st.emergency_triggered = true;
            remediation = Some(outcome);
        }

        st.last_check = Some(Utc::now());
        let persisted = self.persist(&st).await;
        let day = self.publish(st).await;

        CycleSummary {
            day,
            report,
            remediation,
            persisted,
        }
    }

    /// Operator gate override. `allow=false` closes with the manual
    /// reason; `allow=true` reopens. Reopening does not suppress the next
    /// cycle's checks: a still-breached ceiling will close the gate again.
    pub async fn force_override(&self, allow: bool, note: Option<String>) -> DailyState {
        let mut st = self.state.lock().await;
        if allow {
            st.reopen();
            info!(note = note.as_deref().unwrap_or(""), "operator reopened the gate");
        } else {
            st.block(BlockReason::Manual);
            warn!(note = note.as_deref().unwrap_or(""), "operator closed the gate");
        }
        self.audit("manual_override", json!({ "allow": allow, "note": note }))
            .await;
        self.persist(&st).await;
        self.publish(st).await
    }

    /// Discard today's record and start a fresh OPEN day.
    pub async fn force_reset(&self) -> DailyState {
        let mut st = self.state.lock().await;
        let today = Utc::now().with_timezone(&self.cfg.tz).date_naive();
        *st = DailyState::fresh(today);
        warn!(date = %today, "operator reset the day record");
        self.audit("manual_reset", json!({ "date": today })).await;
        self.persist(&st).await;
        self.publish(st).await
    }

    /// Webhook bookkeeping for orders placed outside the broker's books.
    /// The ceiling itself is enforced on the next evaluation cycle.
    pub async fn record_orders(&self, count: u32) -> DailyState {
        let mut st = self.state.lock().await;
        st.order_count = st.order_count.saturating_add(count);
        debug!(added = count, total = st.order_count, "external orders recorded");
        self.audit(
            "orders_recorded",
            json!({ "added": count, "total": st.order_count }),
        )
        .await;
        self.persist(&st).await;
        self.publish(st).await
    }

    /// Operator-invoked unwind. Runs the full protocol, then closes the
    /// gate with the emergency reason.
    pub async fn trigger_emergency(&self, reason: Option<String>) -> (DailyState, EmergencyReport) {
        let mut st = self.state.lock().await;
        let trigger =
            reason.unwrap_or_else(|| BlockReason::Emergency.as_text().to_string());
        warn!(%trigger, "emergency protocol invoked manually");

        let outcome = run_protocol(self.broker.as_ref(), &trigger).await;
        self.audit_protocol(&outcome).await;

        st.block(BlockReason::Emergency);
        st.emergency_triggered = true;
        st.last_check = Some(Utc::now());
        self.persist(&st).await;
        let day = self.publish(st).await;
        (day, outcome)
    }

    /// Advisory balance read for the dashboard. Refreshes
    /// `current_balance` only; gating always uses the cycle's own read.
    pub async fn refresh_balance(&self) -> Result<BalanceReading, BrokerError> {
        let reading = self.broker.fetch_balance().await?;
        if reading.amount.is_finite() && reading.amount > 0.0 {
            let mut st = self.state.lock().await;
            st.current_balance = Some(reading.amount);
            self.persist(&st).await;
            self.publish(st).await;
        }
        Ok(reading)
    }

    /// One balance read and one order-book read, each tolerated to fail.
    /// A failed read is "no evidence this tick", never a state change.
    async fn fetch_truth(&self) -> (Option<f64>, Option<u32>) {
        let balance = match self.broker.fetch_balance().await {
            Ok(reading) => {
                debug!(amount = reading.amount, source = %reading.source, "balance read");
                Some(reading.amount)
            }
            Err(err) => {
                warn!(%err, "balance unavailable this tick");
                None
            }
        };
        let orders_today = match self.broker.fetch_orders().await {
            Ok(orders) => Some(orders.len() as u32),
            Err(err) => {
                warn!(%err, "order book unavailable this tick");
                None
            }
        };
        (balance, orders_today)
    }

    async fn note_transitions(&self, st: &DailyState, report: &CycleReport) {
        if report.rolled_over {
            info!(date = %st.date, "new trading day; fresh record");
            self.audit("day_rollover", json!({ "date": st.date })).await;
        }
        if let Some(reason) = report.blocked {
            warn!(reason = %reason, "trading gate closed");
            self.audit("blocked", json!({ "reason": reason.as_text() }))
                .await;
        }
        if report.reopened {
            info!("session resumed; trading gate reopened");
            self.audit("reopened", json!({})).await;
        }
        if report.captured_morning {
            info!(
                morning = ?st.morning_balance,
                ceiling = ?st.loss_ceiling,
                "morning balance captured"
            );
            self.audit(
                "morning_captured",
                json!({ "morning": st.morning_balance, "ceiling": st.loss_ceiling }),
            )
            .await;
        }
    }

    async fn audit_protocol(&self, outcome: &EmergencyReport) {
        self.audit(
            "emergency_protocol",
            json!({
                "trigger": outcome.trigger,
                "orders_cancelled": outcome.orders_cancelled,
                "cancel_failures": outcome.cancel_failures,
                "positions_exited": outcome.positions_exited,
                "exit_failures": outcome.exit_failures,
            }),
        )
        .await;
    }

    async fn audit(&self, kind: &str, detail: Value) {
        if let Some(log) = &self.audit_log {
            if let Err(err) = log.lock().await.append(kind, detail) {
                error!(%err, "audit append failed");
            }
        }
    }

    /// An unpersisted BLOCKED transition is a loss of safety state, so a
    /// write failure is loud. The process stays up; the next tick writes
    /// again.
    async fn persist(&self, st: &DailyState) -> bool {
        match self.store.save_day(st) {
            Ok(()) => true,
            Err(err) => {
                error!(%err, "failed to persist day record");
                self.audit("persist_failed", json!({ "error": err.to_string() }))
                    .await;
                false
            }
        }
    }

    /// Mirror the record for readers, then release the state lock. Writers
    /// publish in the same order they held the lock.
    async fn publish(&self, st: tokio::sync::MutexGuard<'_, DailyState>) -> DailyState {
        let day = st.clone();
        *self.published.write().await = day.clone();
        drop(st);
        day
    }
}
