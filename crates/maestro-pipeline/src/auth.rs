//! Deny-by-default authorization.
//!
//! The first user ever seen is auto-registered as the owner and persisted
//! to the local env store; afterwards only the allow-list may interact.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use maestro_core::envstore::ConfigStore;

/// Fixed sentence sent to unauthorized users.
pub const REJECTION_SENTENCE: &str = "Sorry, I only talk to my owner.";

const OWNER_KEY: &str = "OWNER_TELEGRAM_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// First-ever user, now registered as owner.
    RegisteredOwner,
    Allowed,
    Denied,
}

pub struct Authorizer {
    env: Arc<dyn ConfigStore>,
    owner: Mutex<Option<String>>,
    allowed: Mutex<HashSet<String>>,
}

impl Authorizer {
    pub fn new(env: Arc<dyn ConfigStore>) -> Self {
        let owner = env.get(OWNER_KEY);
        let mut allowed = HashSet::new();
        if let Some(ref id) = owner {
            allowed.insert(id.clone());
        }
        Self {
            env,
            owner: Mutex::new(owner),
            allowed: Mutex::new(allowed),
        }
    }

    pub fn check(&self, user_id: &str) -> AuthDecision {
        {
            let mut owner = self.owner.lock().unwrap();
            if owner.is_none() {
                *owner = Some(user_id.to_string());
                self.allowed.lock().unwrap().insert(user_id.to_string());
                if let Err(e) = self.env.save_credential(OWNER_KEY, user_id) {
                    warn!(error = %e, "failed to persist owner id");
                }
                info!(user_id, "first user auto-registered as owner");
                return AuthDecision::RegisteredOwner;
            }
        }

        if self.allowed.lock().unwrap().contains(user_id) {
            AuthDecision::Allowed
        } else {
            AuthDecision::Denied
        }
    }

    /// Extend the allow-list at runtime (owner-driven).
    pub fn allow(&self, user_id: &str) {
        self.allowed.lock().unwrap().insert(user_id.to_string());
    }

    pub fn owner(&self) -> Option<String> {
        self.owner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::envstore::EnvStore;

    #[test]
    fn first_user_becomes_owner_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let env: Arc<dyn ConfigStore> = Arc::new(EnvStore::open(dir.path()));
        let auth = Authorizer::new(env.clone());

        assert_eq!(auth.check("111"), AuthDecision::RegisteredOwner);
        assert_eq!(auth.check("111"), AuthDecision::Allowed);
        assert_eq!(auth.check("222"), AuthDecision::Denied);
        assert_eq!(env.get(OWNER_KEY).as_deref(), Some("111"));

        // A fresh authorizer re-reads the persisted owner.
        let auth2 = Authorizer::new(env);
        assert_eq!(auth2.check("222"), AuthDecision::Denied);
        assert_eq!(auth2.check("111"), AuthDecision::Allowed);
    }

    #[test]
    fn allow_extends_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let env: Arc<dyn ConfigStore> = Arc::new(EnvStore::open(dir.path()));
        let auth = Authorizer::new(env);
        auth.check("111");
        auth.allow("333");
        assert_eq!(auth.check("333"), AuthDecision::Allowed);
    }
}
