//! twd-broker: the one crate that speaks HTTP to the brokerage.
//!
//! Everything the governor asks of the broker goes through the
//! [`BrokerApi`] trait. The live adapter ([`dhan::DhanBroker`]) keeps a
//! bounded deadline on every call and collapses all failures into
//! [`BrokerError`]; nothing in here retries. Balance extraction over the
//! broker's loosely-shaped payloads is a pure function in [`balance`].

pub mod api;
pub mod balance;
pub mod dhan;

pub use api::{BrokerApi, BrokerError};
pub use balance::resolve_balance;
pub use dhan::DhanBroker;
