//! twd-governor: owns the day record and every transition of it.
//!
//! All writes are serialized behind one lock. Evaluation cycles, operator
//! actions, and webhook bookkeeping each take that mutex, mutate the whole
//! record, and persist before releasing it. Reads go to a separately
//! published snapshot so the control surface never waits on a broker call.

mod emergency;
mod governor;

pub use emergency::{run_protocol, EmergencyReport};
pub use governor::{CycleSummary, Governor, GovernorConfig};
