//! Executes a single worker job: a bounded tool loop against the worker
//! model with a scoped tool set, a per-job timeout, and a shared cancel
//! token.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use maestro_jobs::{Job, WorkerType};

use crate::provider::{ChatRequest, ModelProvider, ProviderError, StopReason};
use crate::tools::{call_summary, outcome_to_value, ToolCatalog, ToolContext, ToolError};
use crate::truncate::truncate_result;

/// How a worker run ended. The dispatcher maps this onto the job record.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    Completed(String),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Progress emitted while a run is in flight.
#[derive(Debug, Clone)]
pub enum WorkerProgress {
    LlmCall,
    /// One-line summary of an executed tool call.
    ToolCall(String),
    Thinking(String),
}

pub struct WorkerRuntime {
    pub provider: Arc<dyn ModelProvider>,
    pub tools: Arc<dyn ToolCatalog>,
    pub model: String,
    pub max_tool_depth: usize,
}

impl WorkerRuntime {
    /// Drive the worker model until it finishes the task, errors, is
    /// cancelled, or runs out of time or depth.
    pub async fn run(
        &self,
        job: &Job,
        skill_prompt: Option<String>,
        cancel: CancellationToken,
        progress: mpsc::UnboundedSender<WorkerProgress>,
    ) -> WorkerOutcome {
        let deadline = Instant::now() + Duration::from_secs(job.worker_type.timeout_secs());
        let system = build_worker_prompt(job.worker_type, skill_prompt.as_deref());
        let scope = job.worker_type.allowed_tools();
        let tool_defs = self.tools.definitions(scope);
        let ctx = ToolContext::for_job(job.chat_id.clone(), job.id.clone(), cancel.clone());

        let mut messages: Vec<Value> = vec![json!({ "role": "user", "content": job.task })];

        for depth in 0..self.max_tool_depth {
            if cancel.is_cancelled() {
                return WorkerOutcome::Cancelled;
            }

            let req = ChatRequest {
                model: self.model.clone(),
                system: system.clone(),
                messages: messages.clone(),
                max_tokens: 4096,
                tools: tool_defs.clone(),
            };

            debug!(job_id = %job.id, depth, "worker model call");
            let resp = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WorkerOutcome::Cancelled,
                _ = tokio::time::sleep_until(deadline) => return WorkerOutcome::TimedOut,
                r = self.provider.chat(&req) => match r {
                    Ok(resp) => resp,
                    Err(ProviderError::Cancelled) => return WorkerOutcome::Cancelled,
                    Err(e) => return WorkerOutcome::Failed(e.to_string()),
                },
            };
            let _ = progress.send(WorkerProgress::LlmCall);
            if !resp.text.is_empty() && resp.stop_reason == StopReason::ToolUse {
                let _ = progress.send(WorkerProgress::Thinking(resp.text.clone()));
            }

            match resp.stop_reason {
                StopReason::EndTurn => {
                    info!(job_id = %job.id, depth, "worker finished");
                    return WorkerOutcome::Completed(resp.text);
                }

                StopReason::ToolUse => {
                    messages.push(json!({ "role": "assistant", "content": resp.raw_content }));

                    let mut results: Vec<Value> = Vec::with_capacity(resp.tool_calls.len());
                    for call in &resp.tool_calls {
                        let outcome = if !scope.contains(&call.name.as_str()) {
                            Err(ToolError::OutOfScope {
                                name: call.name.clone(),
                            })
                        } else {
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return WorkerOutcome::Cancelled,
                                _ = tokio::time::sleep_until(deadline) => return WorkerOutcome::TimedOut,
                                r = self.tools.execute(&call.name, call.input.clone(), &ctx) => r,
                            }
                        };

                        let _ = progress
                            .send(WorkerProgress::ToolCall(call_summary(&call.name, &call.input)));
                        let rendered = truncate_result(&outcome_to_value(outcome));
                        results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": call.id,
                            "content": rendered,
                        }));
                    }

                    messages.push(json!({ "role": "user", "content": results }));
                }

                StopReason::Other => {
                    warn!(job_id = %job.id, "worker stopped for an unhandled reason");
                    return WorkerOutcome::Failed("unhandled model stop reason".to_string());
                }
            }
        }

        WorkerOutcome::Failed(format!(
            "exceeded maximum tool depth ({})",
            self.max_tool_depth
        ))
    }
}

fn build_worker_prompt(worker_type: WorkerType, skill_prompt: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a specialized {} worker agent. {}.\n\
         Work autonomously with the tools available to you and finish with a \
         concise report of what was done. Do not ask questions; make \
         reasonable assumptions and note them in the report.",
        worker_type.label(),
        worker_type.description()
    );
    if let Some(skill) = skill_prompt {
        prompt.push_str("\n\n");
        prompt.push_str(skill);
    }
    prompt
}
