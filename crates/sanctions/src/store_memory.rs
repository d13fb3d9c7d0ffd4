//! In-memory store for testing.

use std::{collections::HashMap, sync::Mutex};

use {async_trait::async_trait, gatehouse_common::UserId};

use crate::{
    Error, Result,
    store::SanctionStore,
    types::{ModLogEntry, NewModLogEntry, PendingAction},
};

/// In-memory store backed by `HashMap`. No persistence.
#[derive(Default)]
pub struct InMemorySanctionStore {
    actions: Mutex<HashMap<String, PendingAction>>,
    log: Mutex<Vec<ModLogEntry>>,
}

impl InMemorySanctionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SanctionStore for InMemorySanctionStore {
    async fn save_action(&self, action: &PendingAction) -> Result<()> {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        if actions.values().any(|a| a.applicant == action.applicant) {
            return Err(Error::AlreadyActive {
                applicant: action.applicant,
            });
        }
        actions.insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn delete_action(&self, id: &str) -> Result<bool> {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(actions.remove(id).is_some())
    }

    async fn list_actions(&self) -> Result<Vec<PendingAction>> {
        let actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = actions.values().cloned().collect();
        list.sort_by_key(|a| a.expires_at_ms);
        Ok(list)
    }

    async fn action_for(&self, applicant: UserId) -> Result<Option<PendingAction>> {
        let actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(actions.values().find(|a| a.applicant == applicant).cloned())
    }

    async fn add_mod_log(&self, entry: &NewModLogEntry) -> Result<ModLogEntry> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let stored = ModLogEntry {
            id: i64::try_from(log.len()).unwrap_or(i64::MAX).saturating_add(1),
            applicant: entry.applicant,
            moderator: entry.moderator,
            action: entry.action,
            reason: entry.reason.clone(),
            timestamp_ms: entry.timestamp_ms,
        };
        log.push(stored.clone());
        Ok(stored)
    }

    async fn mod_logs(&self, applicant: UserId) -> Result<Vec<ModLogEntry>> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        Ok(log
            .iter()
            .rev()
            .filter(|e| e.applicant == applicant)
            .cloned()
            .collect())
    }
}
