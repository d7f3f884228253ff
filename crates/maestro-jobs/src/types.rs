use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maestro_core::types::ChatId;

/// Specialized worker roles. Defined once at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    Coding,
    Browser,
    System,
    Devops,
    Research,
    Social,
}

impl WorkerType {
    pub const ALL: [WorkerType; 6] = [
        WorkerType::Coding,
        WorkerType::Browser,
        WorkerType::System,
        WorkerType::Devops,
        WorkerType::Research,
        WorkerType::Social,
    ];

    pub fn emoji(&self) -> &'static str {
        match self {
            WorkerType::Coding => "💻",
            WorkerType::Browser => "🌐",
            WorkerType::System => "⚙️",
            WorkerType::Devops => "🚀",
            WorkerType::Research => "🔍",
            WorkerType::Social => "💬",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkerType::Coding => "coding",
            WorkerType::Browser => "browser",
            WorkerType::System => "system",
            WorkerType::Devops => "devops",
            WorkerType::Research => "research",
            WorkerType::Social => "social",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WorkerType::Coding => "Writes, edits, and runs code in the workspace",
            WorkerType::Browser => "Drives a headless browser to visit and extract pages",
            WorkerType::System => "Inspects and manages the local machine",
            WorkerType::Devops => "Builds, deploys, and operates services",
            WorkerType::Research => "Gathers and distills information from the web",
            WorkerType::Social => "Drafts and publishes outbound content",
        }
    }

    /// Per-job wall-clock budget in seconds.
    pub fn timeout_secs(&self) -> u64 {
        match self {
            WorkerType::Coding => 600,
            WorkerType::Browser => 300,
            WorkerType::System => 300,
            WorkerType::Devops => 600,
            WorkerType::Research => 600,
            WorkerType::Social => 300,
        }
    }

    /// Tools this worker may call; everything else is refused.
    pub fn allowed_tools(&self) -> &'static [&'static str] {
        match self {
            WorkerType::Coding => &[
                "shell",
                "read_file",
                "write_file",
                "patch_file",
                "list_files",
                "search_files",
                "git",
            ],
            WorkerType::Browser => &[
                "browser_goto",
                "browser_screenshot",
                "browser_extract",
                "http_request",
            ],
            WorkerType::System => &["shell", "read_file", "list_files", "search_files"],
            WorkerType::Devops => &["shell", "git", "http_request", "read_file", "write_file"],
            WorkerType::Research => &[
                "http_request",
                "browser_goto",
                "browser_extract",
                "text_summarize",
            ],
            WorkerType::Social => &["http_request", "text_summarize", "tts"],
        }
    }
}

impl std::fmt::Display for WorkerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for WorkerType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "coding" => Ok(WorkerType::Coding),
            "browser" => Ok(WorkerType::Browser),
            "system" => Ok(WorkerType::System),
            "devops" => Ok(WorkerType::Devops),
            "research" => Ok(WorkerType::Research),
            "social" => Ok(WorkerType::Social),
            other => Err(format!("unknown worker type: {other}")),
        }
    }
}

/// Lifecycle state. Terminal statuses are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            JobStatus::Queued => "⏳",
            JobStatus::Running => "🔄",
            JobStatus::Completed => "✅",
            JobStatus::Failed => "❌",
            JobStatus::Cancelled => "🚫",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A single worker execution unit, owned by the [`crate::JobManager`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Short printable id, e.g. `j-4fa2c19b`.
    pub id: String,
    pub chat_id: ChatId,
    pub worker_type: WorkerType,
    pub task: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds from start to terminal state.
    pub duration_s: Option<u64>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub depends_on: Vec<String>,
    /// One-line progress history, newest last.
    pub progress: Vec<String>,
    pub llm_calls: u32,
    pub tool_calls: u32,
    pub last_thinking: Option<String>,
    /// Transport message id of the live status card, once opened.
    pub status_message_id: Option<i64>,
    pub structured_result: Option<serde_json::Value>,
}

impl Job {
    /// One-line rendering for `/jobs` listings.
    pub fn summary_line(&self) -> String {
        let duration = self
            .duration_s
            .map(|s| format!(" ({s}s)"))
            .unwrap_or_default();
        format!(
            "{} {} `{}` — {}{}",
            self.status.emoji(),
            self.worker_type.label(),
            self.id,
            self.status,
            duration
        )
    }
}
