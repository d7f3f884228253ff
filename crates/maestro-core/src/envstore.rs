//! Local `.env` store for the owner id and provider credentials.
//!
//! Secrets are write-through: saved here on capture and handed to the
//! provider layer out-of-band. They are never read back into prompts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::Result;

/// Narrow persistence port for credentials and provider selection.
pub trait ConfigStore: Send + Sync {
    fn save_credential(&self, name: &str, value: &str) -> Result<()>;
    /// Record the chosen model for a role (`brain`, `orchestrator`, ...).
    fn save_provider(&self, kind: &str, model: &str) -> Result<()>;
    fn get(&self, name: &str) -> Option<String>;
}

/// File-backed `KEY=value` store at `<data_dir>/.env`.
pub struct EnvStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EnvStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(".env"),
            lock: Mutex::new(()),
        }
    }

    fn read_pairs(&self) -> Vec<(String, String)> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let (k, v) = line.split_once('=')?;
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect()
    }

    fn write_pairs(&self, pairs: &[(String, String)]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = String::new();
        for (k, v) in pairs {
            out.push_str(k);
            out.push('=');
            out.push_str(v);
            out.push('\n');
        }
        fs::write(&self.path, out)?;
        Ok(())
    }

    fn upsert(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut pairs = self.read_pairs();
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => pairs.push((key.to_string(), value.to_string())),
        }
        self.write_pairs(&pairs)
    }
}

impl ConfigStore for EnvStore {
    fn save_credential(&self, name: &str, value: &str) -> Result<()> {
        if let Err(e) = self.upsert(name, value) {
            warn!(key = %name, error = %e, "failed to persist credential");
            return Err(e);
        }
        Ok(())
    }

    fn save_provider(&self, kind: &str, model: &str) -> Result<()> {
        let key = format!("{}_MODEL", kind.to_uppercase());
        self.upsert(&key, model)
    }

    fn get(&self, name: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap();
        self.read_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}
