//! Per-chat message pipeline: authorization, batching, strict FIFO
//! queueing, pending-input state machines, typing indicators, human-like
//! delays, message splitting, and the user command surface.

pub mod auth;
pub mod batch;
pub mod commands;
pub mod delay;
pub mod error;
pub mod pending;
pub mod pipeline;
pub mod queue;
pub mod ratelimit;
pub mod split;
pub mod transport;
pub mod typing;

pub use error::{PipelineError, Result};
pub use pipeline::ChatPipeline;
pub use transport::{ChatAction, IncomingEvent, IncomingMessage, ParseMode, Transport, TransportError};
