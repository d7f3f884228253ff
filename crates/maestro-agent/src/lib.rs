//! Orchestrator and worker runtimes: the tool-use loops driven against
//! injected model providers, plus the ports the core consumes.

pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod provider;
pub mod status;
pub mod tools;
pub mod truncate;
pub mod worker;

pub use error::{AgentError, Result};
pub use orchestrator::Orchestrator;
pub use provider::{ChatRequest, ChatResponse, ModelProvider, ProviderError, StopReason, ToolCall, ToolDefinition};
pub use tools::{ToolCatalog, ToolContext, ToolError};
