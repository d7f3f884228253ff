//! Five-field cron expression engine.
//!
//! Fields: minute, hour, day-of-month, month, day-of-week (0=Sunday, 7
//! accepted as Sunday). Each field supports `*`, literals, `a-b` ranges,
//! `a-b/s` and `*/s` steps, and comma lists. Matching uses local time.

use chrono::{DateTime, Datelike, Local, Timelike};

use crate::error::{Result, SchedulerError};

#[derive(Clone, Debug)]
pub struct CronExpr {
    min: Field,
    hour: Field,
    dom: Field,
    mon: Field,
    dow: Field,
}

#[derive(Clone, Debug)]
struct Field {
    min: u32,
    max: u32,
    any: bool,
    allowed: Vec<bool>, // index = value
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(SchedulerError::InvalidCron(format!(
                "expected 5 fields, got {}",
                parts.len()
            )));
        }

        Ok(Self {
            min: Field::parse(parts[0], 0, 59, false)?,
            hour: Field::parse(parts[1], 0, 23, false)?,
            dom: Field::parse(parts[2], 1, 31, false)?,
            mon: Field::parse(parts[3], 1, 12, false)?,
            dow: Field::parse(parts[4], 0, 6, true)?,
        })
    }

    pub fn matches(&self, dt: DateTime<Local>) -> bool {
        if !self.min.contains(dt.minute())
            || !self.hour.contains(dt.hour())
            || !self.mon.contains(dt.month())
        {
            return false;
        }

        // Standard cron semantics: when both DOM and DOW are restricted,
        // match when either one matches.
        let dom_match = self.dom.contains(dt.day());
        let dow_match = self.dow.contains(dt.weekday().num_days_from_sunday());

        match (self.dom.any, self.dow.any) {
            (true, true) => true,
            (true, false) => dow_match,
            (false, true) => dom_match,
            (false, false) => dom_match || dow_match,
        }
    }

    /// Earliest minute strictly after `now` (seconds truncated) whose five
    /// decomposed fields all match. Walks up to 366 days; `None` past that.
    pub fn next_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut t = now + chrono::Duration::minutes(1);
        t = t.with_second(0)?.with_nanosecond(0)?;

        let max_iters = 366usize * 24 * 60;
        for _ in 0..max_iters {
            if self.matches(t) {
                return Some(t);
            }
            t += chrono::Duration::minutes(1);
        }
        None
    }
}

impl Field {
    fn parse(raw: &str, min: u32, max: u32, sunday_as_7: bool) -> Result<Self> {
        let raw = raw.trim();
        if raw == "*" {
            return Ok(Self {
                min,
                max,
                any: true,
                allowed: vec![true; (max + 1) as usize],
            });
        }

        let mut allowed = vec![false; (max + 1) as usize];
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (base, step) = match part.split_once('/') {
                Some((a, b)) => {
                    let step: u32 = b
                        .trim()
                        .parse()
                        .map_err(|_| SchedulerError::InvalidCron(format!("invalid step: {b}")))?;
                    if step == 0 {
                        return Err(SchedulerError::InvalidCron("step must be > 0".into()));
                    }
                    (a.trim(), Some(step))
                }
                None => (part, None),
            };

            let (start, end) = if base == "*" {
                (min, max)
            } else if let Some((a, b)) = base.split_once('-') {
                (
                    parse_value(a.trim(), sunday_as_7)?,
                    parse_value(b.trim(), sunday_as_7)?,
                )
            } else {
                let v = parse_value(base, sunday_as_7)?;
                // A bare literal with a step extends to the field maximum.
                if step.is_some() {
                    (v, max)
                } else {
                    (v, v)
                }
            };

            let start = start.max(min);
            let end = end.min(max);
            if start > end {
                return Err(SchedulerError::InvalidCron(format!("invalid range: {base}")));
            }

            let step = step.unwrap_or(1);
            let mut v = start;
            while v <= end {
                allowed[v as usize] = true;
                v = v.saturating_add(step);
            }
        }

        let any = (min..=max).all(|v| allowed[v as usize]);
        Ok(Self {
            min,
            max,
            any,
            allowed,
        })
    }

    fn contains(&self, v: u32) -> bool {
        v >= self.min && v <= self.max && self.allowed.get(v as usize).copied().unwrap_or(false)
    }
}

fn parse_value(s: &str, sunday_as_7: bool) -> Result<u32> {
    let mut v: u32 = s
        .parse()
        .map_err(|_| SchedulerError::InvalidCron(format!("invalid number: {s}")))?;
    if sunday_as_7 && v == 7 {
        v = 0;
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_and_matches_literal_minute() {
        let expr = CronExpr::parse("0 * * * *").unwrap();
        assert!(expr.matches(local(2024, 1, 1, 10, 0, 0)));
        assert!(!expr.matches(local(2024, 1, 1, 10, 1, 0)));
    }

    #[test]
    fn step_from_two_seventeen_fires_at_five() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let next = expr.next_after(local(2024, 1, 1, 0, 2, 17)).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (0, 5, 0));
    }

    #[test]
    fn next_is_strictly_after_even_on_boundary() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let next = expr.next_after(local(2024, 1, 1, 0, 5, 0)).unwrap();
        assert_eq!(next.minute(), 10);
    }

    #[test]
    fn ranges_steps_and_lists() {
        let expr = CronExpr::parse("1-10/3 9,17 * * *").unwrap();
        assert!(expr.matches(local(2024, 3, 4, 9, 1, 0)));
        assert!(expr.matches(local(2024, 3, 4, 17, 4, 0)));
        assert!(expr.matches(local(2024, 3, 4, 9, 7, 0)));
        assert!(!expr.matches(local(2024, 3, 4, 9, 2, 0)));
        assert!(!expr.matches(local(2024, 3, 4, 12, 1, 0)));
    }

    #[test]
    fn dow_seven_is_sunday() {
        let expr = CronExpr::parse("0 12 * * 7").unwrap();
        // 2024-01-07 is a Sunday.
        assert!(expr.matches(local(2024, 1, 7, 12, 0, 0)));
        assert!(!expr.matches(local(2024, 1, 8, 12, 0, 0)));
    }

    #[test]
    fn dom_dow_either_matches_when_both_restricted() {
        // 15th of the month OR any Monday.
        let expr = CronExpr::parse("0 0 15 * 1").unwrap();
        assert!(expr.matches(local(2024, 1, 15, 0, 0, 0))); // Monday AND 15th
        assert!(expr.matches(local(2024, 1, 8, 0, 0, 0))); // Monday only
        assert!(expr.matches(local(2024, 2, 15, 0, 0, 0))); // 15th only (Thursday)
        assert!(!expr.matches(local(2024, 1, 9, 0, 0, 0))); // neither
    }

    #[test]
    fn rejects_wrong_field_count_and_garbage() {
        assert!(CronExpr::parse("* * * *").is_err());
        assert!(CronExpr::parse("a * * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("10-5 * * * *").is_err());
    }

    #[test]
    fn impossible_expression_exhausts_search() {
        // February 31st never exists.
        let expr = CronExpr::parse("0 0 31 2 *").unwrap();
        assert!(expr.next_after(local(2024, 1, 1, 0, 0, 0)).is_none());
    }
}
