//! Quiet-hours window — a timezone-aware "do not disturb" interval in which
//! non-essential automations defer.
//!
//! Resolution order: `QUIET_HOURS_START`/`QUIET_HOURS_END` env vars (`HH:MM`),
//! then `life.quiet_hours.{start,end}` integer hours from config, then the
//! 02:00–06:00 default. Windows that wrap midnight are supported.

use chrono::{NaiveTime, Timelike};

use crate::clock::Clock;
use crate::config::QuietHoursConfig;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Half-open `[start, end)` window over the local minute-of-day index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start_min: u32,
    end_min: u32,
}

impl QuietHours {
    pub fn new(start_min: u32, end_min: u32) -> Self {
        Self {
            start_min: start_min % MINUTES_PER_DAY,
            end_min: end_min % MINUTES_PER_DAY,
        }
    }

    /// Resolve the window from env vars, then config, then the default.
    pub fn resolve(cfg: Option<&QuietHoursConfig>) -> Self {
        if let Some(window) = Self::from_env() {
            return window;
        }
        if let Some(c) = cfg {
            return Self::new(u32::from(c.start) * 60, u32::from(c.end) * 60);
        }
        Self::new(2 * 60, 6 * 60)
    }

    fn from_env() -> Option<Self> {
        let start = std::env::var("QUIET_HOURS_START").ok()?;
        let end = std::env::var("QUIET_HOURS_END").ok()?;
        Some(Self::new(parse_hhmm(&start)?, parse_hhmm(&end)?))
    }

    /// True when `t`'s minute index lies inside the window.
    pub fn contains(&self, t: NaiveTime) -> bool {
        let m = t.hour() * 60 + t.minute();
        if self.start_min <= self.end_min {
            m >= self.start_min && m < self.end_min
        } else {
            // Wraps midnight, e.g. 23:00–06:00.
            m >= self.start_min || m < self.end_min
        }
    }

    /// Milliseconds until the window ends. Positive inside, 0 outside.
    pub fn ms_until_end(&self, t: NaiveTime) -> u64 {
        if !self.contains(t) {
            return 0;
        }
        let secs_of_day = t.num_seconds_from_midnight();
        let end_secs = self.end_min * 60;
        let remaining = if secs_of_day < end_secs {
            end_secs - secs_of_day
        } else {
            (24 * 3600 - secs_of_day) + end_secs
        };
        u64::from(remaining) * 1000
    }

    pub fn is_quiet(&self, clock: &dyn Clock) -> bool {
        self.contains(clock.now_local().time())
    }

    pub fn ms_until_end_at(&self, clock: &dyn Clock) -> u64 {
        self.ms_until_end(clock.now_local().time())
    }

    pub fn start_minute(&self) -> u32 {
        self.start_min
    }

    pub fn end_minute(&self) -> u32 {
        self.end_min
    }
}

/// Parse `HH:MM` into a minute-of-day index.
fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn default_window_contains_early_morning() {
        let q = QuietHours::new(120, 360);
        assert!(q.contains(at(2, 0)));
        assert!(q.contains(at(4, 30)));
        assert!(!q.contains(at(6, 0)), "end is exclusive");
        assert!(!q.contains(at(12, 0)));
    }

    #[test]
    fn wrapping_window() {
        let q = QuietHours::new(23 * 60, 6 * 60);
        assert!(q.contains(at(23, 30)));
        assert!(q.contains(at(1, 0)));
        assert!(!q.contains(at(6, 0)));
        assert!(!q.contains(at(12, 0)));
    }

    #[test]
    fn ms_until_end_inside_and_outside() {
        let q = QuietHours::new(120, 360);
        assert_eq!(q.ms_until_end(at(5, 0)), 60 * 60 * 1000);
        assert_eq!(q.ms_until_end(at(12, 0)), 0);
    }

    #[test]
    fn ms_until_end_across_midnight() {
        let q = QuietHours::new(23 * 60, 60);
        // 23:30 → one and a half hours to 01:00.
        assert_eq!(q.ms_until_end(at(23, 30)), 90 * 60 * 1000);
    }

    #[test]
    fn parse_hhmm_accepts_and_rejects() {
        assert_eq!(parse_hhmm("02:00"), Some(120));
        assert_eq!(parse_hhmm("23:59"), Some(23 * 60 + 59));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("junk"), None);
    }
}
