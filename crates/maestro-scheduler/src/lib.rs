//! Next-fire computation for cron, interval, and random schedules, plus the
//! one-shot timer pool used to arm them.

pub mod cron;
pub mod error;
pub mod schedule;
pub mod timer;
pub mod types;

pub use cron::CronExpr;
pub use error::{Result, SchedulerError};
pub use schedule::next_fire;
pub use timer::TimerPool;
pub use types::Schedule;
