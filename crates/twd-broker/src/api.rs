//! Gateway boundary between the governor and the brokerage.
//!
//! This module defines **only** the contract and its failure
//! classification. The live HTTP adapter lives in [`crate::dhan`]; test
//! doubles live in twd-testkit. Nothing above this boundary may see
//! transport internals.

use std::fmt;

use async_trait::async_trait;

use twd_schemas::{BalanceReading, BrokerOrder, BrokerPosition, OrderIntent};

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Uniform classification for a failed broker call.
///
/// The evaluation loop treats these as "no evidence this tick": it logs the
/// failure and carries on with stale values. No variant is retried inside
/// the gateway; the next scheduled tick is the retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The call exceeded the client deadline.
    Timeout,
    /// Connection or transport failure before a status was received.
    Connect(String),
    /// Upstream answered with a non-success HTTP status.
    Status(u16),
    /// A response arrived but its body could not be decoded.
    Unparseable(String),
    /// Every fund endpoint was tried; none yielded a usable figure.
    NoBalance,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Timeout => write!(f, "broker call timed out"),
            BrokerError::Connect(msg) => write!(f, "broker unreachable: {msg}"),
            BrokerError::Status(code) => write!(f, "broker answered HTTP {code}"),
            BrokerError::Unparseable(msg) => write!(f, "broker response unreadable: {msg}"),
            BrokerError::NoBalance => write!(f, "no endpoint yielded a usable balance"),
        }
    }
}

impl std::error::Error for BrokerError {}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Broker operations the governor depends on.
///
/// Implementations must be `Send + Sync`: the daemon holds one behind an
/// `Arc<dyn BrokerApi>` shared by the evaluation loop and the control
/// surface.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Resolve the account's available balance, probing fund endpoints in
    /// priority order.
    async fn fetch_balance(&self) -> Result<BalanceReading, BrokerError>;

    /// Today's orders for this account, all statuses.
    async fn fetch_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;

    /// Current positions, open and squared-off alike.
    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Cancel one working order by broker id.
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// Submit the market order that closes out a position. Returns the
    /// broker's id for the new order.
    async fn place_exit_order(&self, intent: &OrderIntent) -> Result<String, BrokerError>;
}
