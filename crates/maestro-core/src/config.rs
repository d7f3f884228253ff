use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Hard cap on a serialized tool result fed back to a model.
pub const MAX_RESULT_LENGTH: usize = 3000;
/// Per-field cap applied to recognized large fields before the hard cap.
pub const FIELD_TRUNCATE_LENGTH: usize = 500;
/// Transport message size limit; longer replies are split.
pub const MESSAGE_CHUNK_LIMIT: usize = 4096;

/// Top-level config (maestro.toml + MAESTRO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaestroConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub automations: AutomationsConfig,
    #[serde(default)]
    pub life: LifeConfig,
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            orchestrator: OrchestratorConfig::default(),
            conversation: ConversationConfig::default(),
            jobs: JobsConfig::default(),
            pipeline: PipelineConfig::default(),
            automations: AutomationsConfig::default(),
            life: LifeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Bound on tool-loop iterations for both orchestrator and workers.
    #[serde(default = "default_max_tool_depth")]
    pub max_tool_depth: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tool_depth: default_max_tool_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Oldest messages beyond this are dropped FIFO.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Messages kept verbatim when summarizing a stale prefix.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            recent_window: default_recent_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sliding batch window for coalescing rapid user messages.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// Chat id that receives unauthorized-access notices. Optional.
    pub admin_chat: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
            admin_chat: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationsConfig {
    #[serde(default = "default_max_per_chat")]
    pub max_per_chat: usize,
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: u64,
}

impl Default for AutomationsConfig {
    fn default() -> Self {
        Self {
            max_per_chat: default_max_per_chat(),
            min_interval_minutes: default_min_interval_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Base idle interval between spontaneous activities.
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: u64,
    pub quiet_hours: Option<QuietHoursConfig>,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_minutes: default_idle_minutes(),
            quiet_hours: None,
        }
    }
}

/// Integer-hour quiet window from config; env `QUIET_HOURS_*` wins over it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuietHoursConfig {
    pub start: u8,
    pub end: u8,
}

fn bool_true() -> bool {
    true
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_tool_depth() -> usize {
    12
}
fn default_max_history() -> usize {
    200
}
fn default_recent_window() -> usize {
    20
}
fn default_max_concurrent_jobs() -> usize {
    3
}
fn default_batch_window_ms() -> u64 {
    3000
}
fn default_max_per_chat() -> usize {
    10
}
fn default_min_interval_minutes() -> u64 {
    5
}
fn default_idle_minutes() -> u64 {
    45
}
fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.maestro")
}

impl MaestroConfig {
    /// Load config from a TOML file with MAESTRO_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.maestro/maestro.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MaestroConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MAESTRO_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.maestro/maestro.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = MaestroConfig::default();
        assert_eq!(cfg.automations.max_per_chat, 10);
        assert_eq!(cfg.automations.min_interval_minutes, 5);
        assert_eq!(cfg.pipeline.batch_window_ms, 3000);
        assert!(cfg.orchestrator.max_tool_depth > 0);
        assert!(cfg.conversation.max_history >= cfg.conversation.recent_window);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = MaestroConfig::load(Some("/nonexistent/maestro.toml")).unwrap();
        assert_eq!(cfg.jobs.max_concurrent_jobs, 3);
    }
}
