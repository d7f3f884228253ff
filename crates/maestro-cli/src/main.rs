//! Startup CLI: validates the local installation before the host process
//! wires transports and providers in. Exit code 0 when every check
//! passes, 1 otherwise.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use maestro_core::clock::{Clock, SystemClock};
use maestro_core::config::MaestroConfig;
use maestro_core::quiet::QuietHours;
use maestro_scheduler::next_fire;
use maestro_store::ConversationStore;

#[derive(Parser)]
#[command(name = "maestro", about = "Conversational agent orchestration core")]
struct Cli {
    /// Path to maestro.toml (default: ~/.maestro/maestro.toml).
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run startup checks: config, data dir, stores, persisted automations.
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maestro=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check => match run_checks(cli.config.as_deref()) {
            Ok(()) => {
                info!("all startup checks passed");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("startup check failed: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run_checks(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = MaestroConfig::load(config_path)?;
    info!(data_dir = %config.data_dir, "config loaded");

    std::fs::create_dir_all(&config.data_dir)?;
    let probe = std::path::Path::new(&config.data_dir).join(".write-probe");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)?;
    info!("data dir is writable");

    let quiet = QuietHours::resolve(config.life.quiet_hours.as_ref());
    info!(
        start_min = quiet.start_minute(),
        end_min = quiet.end_minute(),
        "quiet hours resolved"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = ConversationStore::open(
        &config.data_dir,
        config.conversation.max_history,
        config.conversation.recent_window,
        clock.clone(),
    );
    info!(chats = store.chats().len(), "conversation store loaded");

    check_automations(&config, clock)?;
    Ok(())
}

/// Load the persisted automations and verify every enabled schedule still
/// produces a future fire time.
fn check_automations(config: &MaestroConfig, clock: Arc<dyn Clock>) -> anyhow::Result<()> {
    let manager = maestro_automation::AutomationManager::open(
        &config.data_dir,
        config.automations.max_per_chat,
        config.automations.min_interval_minutes,
        QuietHours::resolve(config.life.quiet_hours.as_ref()),
        clock.clone(),
    );

    let path = std::path::Path::new(&config.data_dir).join("automations.json");
    if !path.exists() {
        info!("no automations file yet");
        return Ok(());
    }

    let raw = std::fs::read_to_string(&path)?;
    let records: Vec<maestro_automation::Automation> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("automations.json is corrupt: {e}"))?;

    let now = clock.now_utc();
    for automation in &records {
        automation
            .schedule
            .validate(config.automations.min_interval_minutes)
            .map_err(|e| anyhow::anyhow!("automation {}: {e}", automation.id))?;
        if automation.enabled {
            let next = next_fire(&automation.schedule, now, automation.last_run);
            if next <= now {
                warn!(automation_id = %automation.id, "stale next fire, will re-arm at startup");
            }
        }
    }
    info!(
        count = records.len(),
        loaded = manager.count(),
        "automations validated"
    );
    Ok(())
}
