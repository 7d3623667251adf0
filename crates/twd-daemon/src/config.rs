//! Environment-driven daemon configuration.
//!
//! Every knob has a production default; a malformed value falls back to
//! that default with a warning rather than refusing to boot. An empty
//! access token boots too: broker reads fail until one is supplied, and
//! the governor treats those failures as absent evidence.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use tracing::warn;

use twd_governor::GovernorConfig;
use twd_risk::{RiskConfig, SessionWindow};

pub struct DaemonConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    /// `None` disables the audit log (TWD_AUDIT_PATH set to empty).
    pub audit_path: Option<PathBuf>,
    pub tick_secs: u64,
    pub broker_base: String,
    pub access_token: String,
    pub governor: GovernorConfig,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        let access_token = env_raw("DHAN_ACCESS_TOKEN").unwrap_or_default();
        if access_token.is_empty() {
            warn!("DHAN_ACCESS_TOKEN is empty; broker reads will be rejected until one is set");
        }

        let defaults = GovernorConfig::sane_defaults();
        let mut loss_fraction = parsed_or(
            "TWD_LOSS_FRACTION",
            env_raw("TWD_LOSS_FRACTION"),
            defaults.risk.loss_fraction,
        );
        // The ceiling is a fraction of the morning balance; anything outside
        // [0, 1] is a typo, not a policy. Zero stays legal (check disabled).
        if !(0.0..=1.0).contains(&loss_fraction) {
            warn!(loss_fraction, "loss fraction outside [0, 1], using default");
            loss_fraction = defaults.risk.loss_fraction;
        }

        let governor = GovernorConfig {
            risk: RiskConfig {
                loss_fraction,
                max_orders: parsed_or(
                    "TWD_MAX_ORDERS",
                    env_raw("TWD_MAX_ORDERS"),
                    defaults.risk.max_orders,
                ),
                session: session_window(
                    env_raw("TWD_SESSION_OPEN"),
                    env_raw("TWD_SESSION_CLOSE"),
                    defaults.risk.session,
                ),
            },
            tz: parsed_or("TWD_SESSION_TZ", env_raw("TWD_SESSION_TZ"), defaults.tz),
        };

        Ok(Self {
            addr: parsed_or(
                "TWD_ADDR",
                env_raw("TWD_ADDR"),
                SocketAddr::from(([127, 0, 0, 1], 8791)),
            ),
            db_path: PathBuf::from(
                env_raw("TWD_DB_PATH").unwrap_or_else(|| "twd_state.sqlite3".to_string()),
            ),
            audit_path: audit_path(std::env::var("TWD_AUDIT_PATH").ok()),
            tick_secs: parsed_or("TWD_TICK_SECS", env_raw("TWD_TICK_SECS"), 30),
            broker_base: env_raw("TWD_BROKER_BASE")
                .unwrap_or_else(|| "https://api.dhan.co/v2".to_string()),
            access_token,
            governor,
        })
    }
}

/// Read a variable, treating empty / whitespace values as unset.
fn env_raw(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `raw` as `T`, keeping `default` (with a warning) when it will not.
fn parsed_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match raw {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(name, %raw, %default, "unparseable value, using default");
                default
            }
        },
        None => default,
    }
}

fn session_window(
    open: Option<String>,
    close: Option<String>,
    default: SessionWindow,
) -> SessionWindow {
    let open = open.unwrap_or_else(|| default.open_hhmm());
    let close = close.unwrap_or_else(|| default.close_hhmm());
    match SessionWindow::from_hhmm(&open, &close) {
        Some(w) => w,
        None => {
            warn!(%open, %close, "bad session window, using default");
            default
        }
    }
}

/// Audit file location. Unset means the default file next to the binary;
/// an explicitly empty value disables auditing.
fn audit_path(raw: Option<String>) -> Option<PathBuf> {
    match raw {
        Some(raw) if raw.trim().is_empty() => None,
        Some(raw) => Some(PathBuf::from(raw)),
        None => Some(PathBuf::from("twd_audit.jsonl")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_takes_good_values_and_keeps_defaults() {
        assert_eq!(parsed_or("X", Some("45".to_string()), 30u64), 45);
        assert_eq!(parsed_or("X", Some("  45 ".to_string()), 30u64), 45);
        assert_eq!(parsed_or("X", Some("soon".to_string()), 30u64), 30);
        assert_eq!(parsed_or("X", None, 30u64), 30);
    }

    #[test]
    fn session_window_falls_back_on_garbage() {
        let d = SessionWindow::nse_intraday();
        let w = session_window(Some("10:00".into()), Some("14:00".into()), d);
        assert_eq!(w.open_hhmm(), "10:00");
        assert_eq!(w.close_hhmm(), "14:00");

        // Inverted window is rejected wholesale.
        let w = session_window(Some("14:00".into()), Some("10:00".into()), d);
        assert_eq!(w, d);
    }

    #[test]
    fn audit_path_empty_disables() {
        assert_eq!(audit_path(None), Some(PathBuf::from("twd_audit.jsonl")));
        assert_eq!(audit_path(Some("".to_string())), None);
        assert_eq!(audit_path(Some("  ".to_string())), None);
        assert_eq!(
            audit_path(Some("/var/lib/twd/audit.jsonl".to_string())),
            Some(PathBuf::from("/var/lib/twd/audit.jsonl"))
        );
    }
}
