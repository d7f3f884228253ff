//! Tool execution port.
//!
//! Tool implementations (shell, git, HTTP, browser, ...) live outside the
//! core; the orchestrator and workers reach them through [`ToolCatalog`],
//! scoped by per-worker allow-lists.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use maestro_core::types::ChatId;

use crate::provider::ToolDefinition;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("tool {name} is not permitted in this scope")]
    OutOfScope { name: String },

    #[error("{0}")]
    Failed(String),

    #[error("tool cancelled")]
    Cancelled,
}

/// Execution context handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub chat: ChatId,
    /// Set when the call originates from a worker job.
    pub job_id: Option<String>,
    /// Tripped on job cancellation or timeout; tools should abort promptly.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn for_chat(chat: ChatId) -> Self {
        Self {
            chat,
            job_id: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn for_job(chat: ChatId, job_id: String, cancel: CancellationToken) -> Self {
        Self {
            chat,
            job_id: Some(job_id),
            cancel,
        }
    }
}

/// Catalog of externally provided tools.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Definitions for the named subset, in catalog order.
    fn definitions(&self, scope: &[&str]) -> Vec<ToolDefinition>;

    async fn execute(&self, name: &str, input: Value, ctx: &ToolContext)
        -> Result<Value, ToolError>;
}

/// Fold a tool outcome into the value fed back to the model. Failures are
/// captured as `{"error": message}` — never raised.
pub fn outcome_to_value(outcome: Result<Value, ToolError>) -> Value {
    match outcome {
        Ok(v) => v,
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    }
}

/// One-line activity summary for progress streams: tool name plus a hint
/// of its input.
pub fn call_summary(name: &str, input: &Value) -> String {
    let hint = match input {
        Value::Object(map) => map
            .values()
            .find_map(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    };
    let hint: String = hint.chars().take(60).collect();
    if hint.is_empty() {
        name.to_string()
    } else {
        format!("{name}: {hint}")
    }
}
