//! Live per-job status card.
//!
//! One transport message per job, opened before the first tool call and
//! edited in place as activity arrives. Edits are rate-limited to one per
//! second; the terminal state always forces a final rewrite.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use maestro_core::types::ChatId;
use maestro_jobs::{Job, JobStatus};

use crate::ports::Outbound;

/// Activity lines shown; older ones collapse into a count.
const VISIBLE_TAIL: usize = 10;
const MIN_EDIT_INTERVAL: Duration = Duration::from_secs(1);

pub struct JobStatusReporter {
    outbound: Arc<dyn Outbound>,
    chat: ChatId,
    title: String,
    lines: Vec<String>,
    message_id: Option<i64>,
    last_edit: Option<Instant>,
    finished: bool,
}

impl JobStatusReporter {
    pub fn new(outbound: Arc<dyn Outbound>, job: &Job) -> Self {
        Self {
            outbound,
            chat: job.chat_id.clone(),
            title: format!(
                "{} {} job `{}`",
                job.worker_type.emoji(),
                job.worker_type.label(),
                job.id
            ),
            lines: Vec::new(),
            message_id: None,
            last_edit: None,
            finished: false,
        }
    }

    /// Open the status message; returns its transport id.
    pub async fn open(&mut self) -> Option<i64> {
        let text = self.render("Working…");
        self.message_id = self.outbound.send(&self.chat, &text).await;
        self.last_edit = Some(Instant::now());
        self.message_id
    }

    /// Append an activity line and refresh the card if the rate gate
    /// allows. Dropped after the terminal rewrite.
    pub async fn activity(&mut self, line: &str) {
        if self.finished {
            return;
        }
        self.lines.push(line.to_string());

        let due = self
            .last_edit
            .map_or(true, |t| t.elapsed() >= MIN_EDIT_INTERVAL);
        if due {
            self.refresh("Working…").await;
        }
    }

    /// Rewrite the header for the terminal state. Always edits, ignoring
    /// the rate gate, then drops further activity.
    pub async fn finish(&mut self, status: JobStatus) {
        if self.finished {
            return;
        }
        self.finished = true;
        let header = match status {
            JobStatus::Completed => "Done",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Queued | JobStatus::Running => "Working…",
        };
        self.refresh(header).await;
    }

    pub fn message_id(&self) -> Option<i64> {
        self.message_id
    }

    async fn refresh(&mut self, state: &str) {
        let Some(id) = self.message_id else { return };
        let text = self.render(state);
        self.outbound.edit(&self.chat, id, &text).await;
        self.last_edit = Some(Instant::now());
    }

    fn render(&self, state: &str) -> String {
        let mut out = format!("{} — {state}", self.title);
        let total = self.lines.len();
        if total > VISIBLE_TAIL {
            out.push_str(&format!("\n… {} earlier lines", total - VISIBLE_TAIL));
        }
        for line in self.lines.iter().skip(total.saturating_sub(VISIBLE_TAIL)) {
            out.push('\n');
            out.push_str(line);
        }
        out
    }
}
