//! Intraday session window.
//!
//! Deterministic, pure time-of-day math. Times are seconds from local
//! midnight so boundary semantics stay explicit; the exchange timezone is
//! the caller's concern.

use chrono::{NaiveTime, Timelike};

/// Inclusive trading window `[open, close]` in exchange-local wall clock.
///
/// A tick at exactly `open` or exactly `close` is inside the session; one
/// second past `close` is outside. Overnight windows (close < open) are not
/// supported — this governs a single intraday cash session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionWindow {
    open_secs: u32,
    close_secs: u32,
}

impl SessionWindow {
    /// NSE equity intraday window used by the default deployment:
    /// 09:25 (shortly after open) to 15:20 (ten minutes before close).
    pub fn nse_intraday() -> Self {
        Self {
            open_secs: 9 * 3600 + 25 * 60,
            close_secs: 15 * 3600 + 20 * 60,
        }
    }

    /// Build from `"HH:MM"` strings. Returns `None` for unparseable input
    /// or an inverted window.
    pub fn from_hhmm(open: &str, close: &str) -> Option<Self> {
        let open_secs = parse_hhmm(open)?;
        let close_secs = parse_hhmm(close)?;
        if close_secs < open_secs {
            return None;
        }
        Some(Self {
            open_secs,
            close_secs,
        })
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        let secs = t.num_seconds_from_midnight();
        secs >= self.open_secs && secs <= self.close_secs
    }

    pub fn open_hhmm(&self) -> String {
        hhmm(self.open_secs)
    }

    pub fn close_hhmm(&self) -> String {
        hhmm(self.close_secs)
    }

    /// Wall-clock open as a `NaiveTime`. Both bounds are always below
    /// 24:00, so the conversion is total.
    pub fn open_time(&self) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(self.open_secs, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn close_time(&self) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(self.close_secs, 0).unwrap_or(NaiveTime::MIN)
    }
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 3600 + m * 60)
}

fn hhmm(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}
