use chrono::{DateTime, Duration, Local, Utc};
use rand::Rng;
use tracing::warn;

use crate::cron::CronExpr;
use crate::types::Schedule;

/// Compute the next UTC fire time for `schedule`.
///
/// Cron walks local wall-clock minutes; a pathological expression that
/// matches nothing within 366 days falls back to `now + 24h`. An overdue
/// interval fires soon (`now + 1s`) rather than immediately, and never
/// twice for one overdue period.
pub fn next_fire(
    schedule: &Schedule,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match schedule {
        Schedule::Cron { expr } => match CronExpr::parse(expr) {
            Ok(parsed) => {
                let local_now = now.with_timezone(&Local);
                match parsed.next_after(local_now) {
                    Some(next) => next.with_timezone(&Utc),
                    None => {
                        warn!(expr = %expr, "cron search exhausted, deferring a day");
                        now + Duration::hours(24)
                    }
                }
            }
            Err(e) => {
                warn!(expr = %expr, error = %e, "unparseable cron expression, deferring a day");
                now + Duration::hours(24)
            }
        },

        Schedule::Interval { minutes } => {
            let minutes = Duration::minutes(*minutes as i64);
            match last_run {
                None => now + minutes,
                Some(last) => {
                    let due = last + minutes;
                    if due > now {
                        due
                    } else {
                        now + Duration::seconds(1)
                    }
                }
            }
        }

        Schedule::Random {
            min_minutes,
            max_minutes,
        } => {
            let lo = *min_minutes * 60;
            let hi = (*max_minutes * 60).max(lo + 1);
            let secs = rand::thread_rng().gen_range(lo..=hi);
            now + Duration::seconds(secs as i64)
        }
    }
}
