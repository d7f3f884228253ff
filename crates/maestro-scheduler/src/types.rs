use serde::{Deserialize, Serialize};

use crate::cron::CronExpr;
use crate::error::{Result, SchedulerError};

/// Defines when a recurring task should fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Standard 5-field cron expression (minute hour dom month dow, 0=Sunday).
    Cron { expr: String },

    /// Fixed interval in minutes from the previous run.
    Interval { minutes: u64 },

    /// Uniform-random delay between `min_minutes` and `max_minutes`.
    Random { min_minutes: u64, max_minutes: u64 },
}

impl Schedule {
    /// Validate shape and bounds. `min_interval` is the floor (in minutes)
    /// for interval and random schedules.
    pub fn validate(&self, min_interval: u64) -> Result<()> {
        match self {
            Schedule::Cron { expr } => {
                if expr.trim().is_empty() {
                    return Err(SchedulerError::InvalidCron("empty expression".into()));
                }
                CronExpr::parse(expr)?;
                Ok(())
            }
            Schedule::Interval { minutes } => {
                if *minutes < min_interval {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "interval must be at least {min_interval} minutes"
                    )));
                }
                Ok(())
            }
            Schedule::Random {
                min_minutes,
                max_minutes,
            } => {
                if *min_minutes < min_interval {
                    return Err(SchedulerError::InvalidSchedule(format!(
                        "random minimum must be at least {min_interval} minutes"
                    )));
                }
                if *max_minutes <= *min_minutes {
                    return Err(SchedulerError::InvalidSchedule(
                        "random maximum must exceed the minimum".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Short human-readable description for listings.
    pub fn describe(&self) -> String {
        match self {
            Schedule::Cron { expr } => format!("cron `{expr}`"),
            Schedule::Interval { minutes } => format!("every {minutes}m"),
            Schedule::Random {
                min_minutes,
                max_minutes,
            } => format!("random {min_minutes}-{max_minutes}m"),
        }
    }
}
