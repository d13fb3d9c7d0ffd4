//! Persistence trait for pending actions and the moderation log.

use {async_trait::async_trait, gatehouse_common::UserId};

use crate::{
    Result,
    types::{ModLogEntry, NewModLogEntry, PendingAction},
};

/// Persistence backend for timed sanctions.
#[async_trait]
pub trait SanctionStore: Send + Sync {
    /// Insert a new action. Fails with [`crate::Error::AlreadyActive`] when
    /// the applicant already has one.
    async fn save_action(&self, action: &PendingAction) -> Result<()>;

    /// Delete an action. Returns `false` when it was already gone.
    async fn delete_action(&self, id: &str) -> Result<bool>;

    async fn list_actions(&self) -> Result<Vec<PendingAction>>;

    async fn action_for(&self, applicant: UserId) -> Result<Option<PendingAction>>;

    async fn add_mod_log(&self, entry: &NewModLogEntry) -> Result<ModLogEntry>;

    /// Every entry for `applicant`, newest first.
    async fn mod_logs(&self, applicant: UserId) -> Result<Vec<ModLogEntry>>;
}
