//! twd-risk
//!
//! The governor's decision core:
//! - Day rollover and the per-day state record
//! - Trading-hours gate (inclusive session window)
//! - Morning balance capture + loss ceiling derivation
//! - Loss-ceiling breach detection (emergency directive)
//! - Order-count ceiling (soft stop)
//!
//! Deterministic, pure logic. No IO, no wall-clock, no broker calls; the
//! caller supplies the local time and the readings for each tick.

mod engine;
mod session;
mod types;

pub use engine::evaluate_cycle;
pub use session::SessionWindow;
pub use types::*;
