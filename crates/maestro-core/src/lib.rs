pub mod clock;
pub mod config;
pub mod envstore;
pub mod error;
pub mod quiet;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use types::{ChatId, LIFE_CHAT};
