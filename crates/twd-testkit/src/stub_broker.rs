//! Scriptable in-memory broker.
//!
//! No randomness, no network I/O. A test scripts the account shape
//! (balance, positions, order book) and the failures to inject, runs the
//! governor against it, then reads back what was cancelled and exited.
//! Exit order ids are deterministic counters.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use twd_broker::{BrokerApi, BrokerError};
use twd_schemas::{BalanceReading, BrokerOrder, BrokerPosition, OrderIntent};

#[derive(Default)]
struct Inner {
    balance: Option<f64>,
    positions: Vec<BrokerPosition>,
    orders: Vec<BrokerOrder>,
    fail_cancel_ids: HashSet<String>,
    fail_all_exits: bool,
    fail_order_list: bool,
    fail_position_list: bool,
    cancelled: Vec<String>,
    exits: Vec<OrderIntent>,
    exit_seq: u64,
    balance_calls: u64,
}

/// Scriptable [`BrokerApi`] double. All state sits behind one async mutex
/// so the test and the governor can share it through an `Arc`.
#[derive(Default)]
pub struct StubBroker {
    inner: Mutex<Inner>,
}

impl StubBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, amount: f64) {
        self.inner.lock().await.balance = Some(amount);
    }

    /// Make every fund endpoint come back empty-handed.
    pub async fn clear_balance(&self) {
        self.inner.lock().await.balance = None;
    }

    pub async fn set_positions(&self, positions: Vec<BrokerPosition>) {
        self.inner.lock().await.positions = positions;
    }

    pub async fn set_orders(&self, orders: Vec<BrokerOrder>) {
        self.inner.lock().await.orders = orders;
    }

    /// Make cancellation of one specific order fail.
    pub async fn fail_cancel(&self, order_id: &str) {
        self.inner
            .lock()
            .await
            .fail_cancel_ids
            .insert(order_id.to_string());
    }

    /// Make every exit order submission fail.
    pub async fn fail_all_exits(&self) {
        self.inner.lock().await.fail_all_exits = true;
    }

    /// Make the order-book listing itself fail.
    pub async fn fail_order_list(&self) {
        self.inner.lock().await.fail_order_list = true;
    }

    /// Make the positions listing itself fail.
    pub async fn fail_position_list(&self) {
        self.inner.lock().await.fail_position_list = true;
    }

    /// Order ids the governor cancelled, in call order.
    pub async fn cancelled(&self) -> Vec<String> {
        self.inner.lock().await.cancelled.clone()
    }

    /// Exit intents the governor submitted, in call order.
    pub async fn exits(&self) -> Vec<OrderIntent> {
        self.inner.lock().await.exits.clone()
    }

    pub async fn balance_calls(&self) -> u64 {
        self.inner.lock().await.balance_calls
    }
}

#[async_trait]
impl BrokerApi for StubBroker {
    async fn fetch_balance(&self) -> Result<BalanceReading, BrokerError> {
        let mut inner = self.inner.lock().await;
        inner.balance_calls += 1;
        match inner.balance {
            Some(amount) => Ok(BalanceReading {
                amount,
                source: "stub:availableBalance".to_string(),
                fetched_at: Utc::now(),
            }),
            None => Err(BrokerError::NoBalance),
        }
    }

    async fn fetch_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let inner = self.inner.lock().await;
        if inner.fail_order_list {
            return Err(BrokerError::Status(502));
        }
        Ok(inner.orders.clone())
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let inner = self.inner.lock().await;
        if inner.fail_position_list {
            return Err(BrokerError::Status(502));
        }
        Ok(inner.positions.clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_cancel_ids.contains(order_id) {
            return Err(BrokerError::Status(400));
        }
        inner.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn place_exit_order(&self, intent: &OrderIntent) -> Result<String, BrokerError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_all_exits {
            return Err(BrokerError::Timeout);
        }
        inner.exit_seq += 1;
        let id = format!("EXIT-{:04}", inner.exit_seq);
        inner.exits.push(intent.clone());
        Ok(id)
    }
}
