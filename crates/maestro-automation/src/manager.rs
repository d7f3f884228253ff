//! Exclusive owner of automation records and their timers.
//!
//! Records persist as a single JSON array; writes happen under a
//! process-wide lock and are idempotent over the full collection. Exactly
//! one pending timer exists per automation; re-arming cancels first.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use maestro_agent::ports::{AutomationOps, SyntheticRunner};
use maestro_core::clock::Clock;
use maestro_core::quiet::QuietHours;
use maestro_core::types::ChatId;
use maestro_scheduler::{next_fire, Schedule, TimerPool};

use crate::error::{AutomationError, Result};
use crate::types::Automation;

/// Extra delay past the quiet window end when a fire defers.
const QUIET_DEFER_SLACK: Duration = Duration::from_secs(60);

pub struct AutomationManager {
    records: Mutex<Vec<Automation>>,
    path: PathBuf,
    timers: TimerPool,
    runner: OnceLock<Arc<dyn SyntheticRunner>>,
    quiet: QuietHours,
    clock: Arc<dyn Clock>,
    max_per_chat: usize,
    min_interval_minutes: u64,
    persist_lock: Mutex<()>,
    /// Handle to ourselves for timer callbacks.
    self_ref: Weak<AutomationManager>,
}

impl AutomationManager {
    /// Load `automations.json` from `data_dir`. Nothing is armed yet;
    /// call [`AutomationManager::arm_all`] once the runner is wired.
    pub fn open(
        data_dir: impl AsRef<Path>,
        max_per_chat: usize,
        min_interval_minutes: u64,
        quiet: QuietHours,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let path = data_dir.as_ref().join("automations.json");
        let records = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<Automation>>(&raw) {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt automations file, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Arc::new_cyclic(|weak| Self {
            records: Mutex::new(records),
            path,
            timers: TimerPool::new(),
            runner: OnceLock::new(),
            quiet,
            clock,
            max_per_chat,
            min_interval_minutes,
            persist_lock: Mutex::new(()),
            self_ref: weak.clone(),
        })
    }

    pub fn set_runner(&self, runner: Arc<dyn SyntheticRunner>) {
        let _ = self.runner.set(runner);
    }

    /// Re-arm every enabled automation; called once at startup. Overdue
    /// intervals fire soon rather than immediately.
    pub fn arm_all(&self) {
        let ids: Vec<String> = {
            let records = self.records.lock().unwrap();
            records
                .iter()
                .filter(|a| a.enabled)
                .map(|a| a.id.clone())
                .collect()
        };
        info!(count = ids.len(), "arming persisted automations");
        for id in ids {
            self.arm(&id);
        }
    }

    pub fn create(
        &self,
        chat: &ChatId,
        name: &str,
        description: &str,
        schedule: Schedule,
        respect_quiet_hours: bool,
    ) -> Result<Automation> {
        schedule.validate(self.min_interval_minutes)?;
        if name.trim().is_empty() {
            return Err(AutomationError::Invalid("name must not be empty".into()));
        }

        let automation = {
            let mut records = self.records.lock().unwrap();
            let per_chat = records
                .iter()
                .filter(|a| a.chat_id == chat.as_str())
                .count();
            if per_chat >= self.max_per_chat {
                return Err(AutomationError::LimitReached {
                    max: self.max_per_chat,
                });
            }

            let automation = Automation {
                id: format!("a-{}", &Uuid::new_v4().simple().to_string()[..8]),
                chat_id: chat.to_string(),
                name: name.trim().to_string(),
                description: description.to_string(),
                schedule,
                enabled: true,
                respect_quiet_hours,
                last_run: None,
                next_run: None,
                run_count: 0,
                last_error: None,
                created_at: self.clock.now_utc(),
            };
            records.push(automation.clone());
            automation
        };

        self.persist();
        self.arm(&automation.id);
        info!(automation_id = %automation.id, name = %automation.name, "automation created");
        self.get(&automation.id)
            .ok_or_else(|| AutomationError::NotFound {
                id: automation.id.clone(),
            })
    }

    /// Patch fields of an automation. Re-arms when it ends up enabled,
    /// disarms otherwise.
    pub fn update(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
        schedule: Option<Schedule>,
        enabled: Option<bool>,
        respect_quiet_hours: Option<bool>,
    ) -> Result<Automation> {
        if let Some(ref s) = schedule {
            s.validate(self.min_interval_minutes)?;
        }

        let now_enabled = {
            let mut records = self.records.lock().unwrap();
            let automation = records
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AutomationError::NotFound { id: id.to_string() })?;

            if let Some(name) = name {
                automation.name = name;
            }
            if let Some(description) = description {
                automation.description = description;
            }
            if let Some(schedule) = schedule {
                automation.schedule = schedule;
            }
            if let Some(enabled) = enabled {
                automation.enabled = enabled;
            }
            if let Some(q) = respect_quiet_hours {
                automation.respect_quiet_hours = q;
            }
            if !automation.enabled {
                automation.next_run = None;
            }
            automation.enabled
        };

        self.persist();
        if now_enabled {
            self.arm(id);
        } else {
            self.timers.cancel(id);
        }
        self.get(id)
            .ok_or_else(|| AutomationError::NotFound { id: id.to_string() })
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.timers.cancel(id);
        let removed = {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|a| a.id != id);
            records.len() < before
        };
        if !removed {
            return Err(AutomationError::NotFound { id: id.to_string() });
        }
        self.persist();
        info!(automation_id = %id, "automation deleted");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Automation> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// Total records across all chats.
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn list(&self, chat: &ChatId) -> Vec<Automation> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.chat_id == chat.as_str())
            .cloned()
            .collect()
    }

    /// Execute an automation immediately, bypassing schedule and quiet
    /// hours. Used by `/auto run <id>`.
    pub async fn run_now(&self, id: &str) -> Result<()> {
        let automation = self
            .get(id)
            .ok_or_else(|| AutomationError::NotFound { id: id.to_string() })?;
        self.execute(automation).await;
        Ok(())
    }

    // --- timer plumbing -----------------------------------------------------

    /// Compute the next fire and arm the one-shot timer for it.
    fn arm(&self, id: &str) {
        let (delay, next) = {
            let mut records = self.records.lock().unwrap();
            let Some(automation) = records.iter_mut().find(|a| a.id == id) else {
                return;
            };
            if !automation.enabled {
                return;
            }
            let now = self.clock.now_utc();
            let next = next_fire(&automation.schedule, now, automation.last_run);
            automation.next_run = Some(next);
            let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            (delay, next)
        };
        self.persist();

        debug!(automation_id = %id, next = %next.to_rfc3339(), "automation armed");
        self.arm_timer(id, delay);
    }

    fn arm_timer(&self, id: &str, delay: Duration) {
        let weak = self.self_ref.clone();
        let id_owned = id.to_string();
        self.timers.arm(id, delay, move || async move {
            if let Some(this) = weak.upgrade() {
                this.fire(&id_owned).await;
            }
        });
    }

    /// Timer callback. Skips stale fires, defers through quiet hours, and
    /// otherwise executes and re-arms.
    async fn fire(&self, id: &str) {
        // Deleted or disabled between scheduling and firing: skip.
        let Some(automation) = self.get(id) else {
            debug!(automation_id = %id, "fire skipped, automation deleted");
            return;
        };
        if !automation.enabled {
            debug!(automation_id = %id, "fire skipped, automation disabled");
            return;
        }

        if automation.respect_quiet_hours && self.quiet.is_quiet(self.clock.as_ref()) {
            let delay = Duration::from_millis(self.quiet.ms_until_end_at(self.clock.as_ref()))
                + QUIET_DEFER_SLACK;
            info!(automation_id = %id, defer_secs = delay.as_secs(), "quiet hours, deferring");

            {
                let mut records = self.records.lock().unwrap();
                if let Some(a) = records.iter_mut().find(|a| a.id == id) {
                    a.next_run = Some(
                        self.clock.now_utc()
                            + chrono::Duration::from_std(delay).unwrap_or_default(),
                    );
                }
            }
            self.persist();
            self.arm_timer(id, delay);
            return;
        }

        self.execute(automation).await;
        self.arm(id);
    }

    /// Run the synthetic prompt through the injected runner and record the
    /// outcome. The runner serializes per chat with live traffic.
    async fn execute(&self, automation: Automation) {
        let Some(runner) = self.runner.get() else {
            warn!(automation_id = %automation.id, "no runner wired, skipping execution");
            return;
        };

        let now = self.clock.now_utc();
        {
            let mut records = self.records.lock().unwrap();
            if let Some(a) = records.iter_mut().find(|a| a.id == automation.id) {
                a.last_run = Some(now);
                a.run_count += 1;
            }
        }

        let chat = ChatId::new(automation.chat_id.clone());
        info!(automation_id = %automation.id, name = %automation.name, "automation firing");
        let outcome = runner.run(&chat, &automation.prompt()).await;

        {
            let mut records = self.records.lock().unwrap();
            if let Some(a) = records.iter_mut().find(|a| a.id == automation.id) {
                match &outcome {
                    Ok(_) => a.last_error = None,
                    Err(e) => {
                        warn!(automation_id = %a.id, error = %e, "automation run failed");
                        a.last_error = Some(e.to_string());
                    }
                }
            }
        }
        self.persist();
    }

    /// Best-effort write of the whole collection under the process lock.
    fn persist(&self) {
        let json = {
            let records = self.records.lock().unwrap();
            match serde_json::to_string_pretty(&*records) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to serialize automations");
                    return;
                }
            }
        };

        let _guard = self.persist_lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %e, "failed to persist automations");
        }
    }
}

// --- tool-surface adapter ---------------------------------------------------

#[async_trait]
impl AutomationOps for AutomationManager {
    async fn create_automation(
        &self,
        chat: &ChatId,
        input: Value,
    ) -> std::result::Result<Value, String> {
        let name = input["name"].as_str().unwrap_or_default();
        let description = input["description"].as_str().unwrap_or_default();
        let schedule: Schedule = serde_json::from_value(input["schedule"].clone())
            .map_err(|e| format!("invalid schedule: {e}"))?;
        let respect_quiet_hours = input["respect_quiet_hours"].as_bool().unwrap_or(false);

        self.create(chat, name, description, schedule, respect_quiet_hours)
            .map(|a| a.view())
            .map_err(|e| e.to_string())
    }

    async fn list_automations(&self, chat: &ChatId) -> Value {
        json!({
            "automations": self.list(chat).iter().map(Automation::view).collect::<Vec<_>>()
        })
    }

    async fn update_automation(
        &self,
        chat: &ChatId,
        input: Value,
    ) -> std::result::Result<Value, String> {
        let id = input["id"].as_str().ok_or("missing required field: id")?;
        ensure_owned(self, chat, id)?;

        let schedule = match input.get("schedule") {
            Some(v) if !v.is_null() => Some(
                serde_json::from_value(v.clone()).map_err(|e| format!("invalid schedule: {e}"))?,
            ),
            _ => None,
        };

        self.update(
            id,
            input["name"].as_str().map(String::from),
            input["description"].as_str().map(String::from),
            schedule,
            input["enabled"].as_bool(),
            input["respect_quiet_hours"].as_bool(),
        )
        .map(|a| a.view())
        .map_err(|e| e.to_string())
    }

    async fn delete_automation(
        &self,
        chat: &ChatId,
        id: &str,
    ) -> std::result::Result<Value, String> {
        ensure_owned(self, chat, id)?;
        self.delete(id).map_err(|e| e.to_string())?;
        Ok(json!({ "deleted": id }))
    }

    async fn run_automation(&self, chat: &ChatId, id: &str) -> std::result::Result<Value, String> {
        ensure_owned(self, chat, id)?;
        self.run_now(id).await.map_err(|e| e.to_string())?;
        Ok(json!({ "ran": id }))
    }
}

fn ensure_owned(
    manager: &AutomationManager,
    chat: &ChatId,
    id: &str,
) -> std::result::Result<(), String> {
    match manager.get(id) {
        Some(a) if a.chat_id == chat.as_str() => Ok(()),
        Some(_) => Err(format!("automation {id} belongs to another chat")),
        None => Err(format!("automation {id} not found")),
    }
}
