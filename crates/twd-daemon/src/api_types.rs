//! Request and response types for all twd-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

use twd_governor::EmergencyReport;
use twd_risk::DailyState;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

/// Point-in-time view returned by GET /v1/status: the published day record
/// plus the limits the governor is currently enforcing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Gate label: "open" | "blocked_hours" | "blocked_loss" |
    /// "blocked_orders" | "blocked_manual" | "blocked_emergency".
    pub state: String,
    pub day: DailyState,
    pub limits: LimitsEcho,
}

/// Echo of the enforcement knobs, so a dashboard needs no second endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsEcho {
    pub loss_fraction: f64,
    pub max_orders: u32,
    pub session_open: String,
    pub session_close: String,
    pub timezone: String,
    pub tick_secs: u64,
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

/// POST /v1/override body. `allow: false` closes the gate, `allow: true`
/// reopens it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub allow: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /v1/emergency body (optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /v1/orders/record body (optional). Absent count means one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOrdersRequest {
    #[serde(default)]
    pub count: Option<u32>,
}

// ---------------------------------------------------------------------------
// Shared response shells
// ---------------------------------------------------------------------------

/// The day record after a mutating call, tagged with its gate label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayResponse {
    pub state: String,
    pub day: DailyState,
}

/// Result of POST /v1/emergency: the day record plus what the unwind did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub state: String,
    pub day: DailyState,
    pub protocol: EmergencyReport,
}

/// Uniform error body for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
