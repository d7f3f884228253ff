use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use maestro_scheduler::Schedule;

/// A scheduled, recurring synthetic user prompt. Persisted as one element
/// of the automations JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    /// Short printable id, e.g. `a-9c41d07b`.
    pub id: String,
    pub chat_id: String,
    pub name: String,
    pub description: String,
    pub schedule: Schedule,
    pub enabled: bool,
    #[serde(default)]
    pub respect_quiet_hours: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Automation {
    /// The synthetic prompt injected when the automation fires.
    pub fn prompt(&self) -> String {
        format!("[AUTOMATION: {}] {}", self.name, self.description)
    }

    /// Tool-layer JSON view.
    pub fn view(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "schedule": self.schedule.describe(),
            "enabled": self.enabled,
            "respect_quiet_hours": self.respect_quiet_hours,
            "next_run": self.next_run.map(|t| t.to_rfc3339()),
            "last_run": self.last_run.map(|t| t.to_rfc3339()),
            "run_count": self.run_count,
            "last_error": self.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prompt_carries_name_and_description() {
        let a = Automation {
            id: "a-1".into(),
            chat_id: "c1".into(),
            name: "ping".into(),
            description: "check the server".into(),
            schedule: Schedule::Interval { minutes: 10 },
            enabled: true,
            respect_quiet_hours: false,
            last_run: None,
            next_run: None,
            run_count: 0,
            last_error: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(a.prompt(), "[AUTOMATION: ping] check the server");
    }
}
