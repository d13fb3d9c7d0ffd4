//! SQLite-backed sanction store using sqlx.

use std::collections::BTreeSet;

use {
    async_trait::async_trait,
    gatehouse_common::{RoleId, UserId},
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{
    Error, Result,
    store::SanctionStore,
    types::{ModLogEntry, NewModLogEntry, PendingAction},
};

/// SQLite-backed persistence for pending actions and the mod log.
pub struct SqliteSanctionStore {
    pool: SqlitePool,
}

impl SqliteSanctionStore {
    /// Create a store using an existing pool.
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn encode_roles(roles: &BTreeSet<RoleId>) -> Result<String> {
    Ok(serde_json::to_string(roles)?)
}

fn decode_roles(raw: &str) -> Result<BTreeSet<RoleId>> {
    Ok(serde_json::from_str(raw)?)
}

fn action_from_row(row: &SqliteRow) -> Result<PendingAction> {
    let kind: String = row.get("kind");
    Ok(PendingAction {
        id: row.get("id"),
        applicant: UserId::new(row.get::<i64, _>("applicant_id") as u64),
        kind: kind.parse()?,
        roles_to_remove: decode_roles(row.get("roles_to_remove"))?,
        roles_to_add: decode_roles(row.get("roles_to_add"))?,
        expires_at_ms: row.get::<i64, _>("expires_at_ms") as u64,
    })
}

fn mod_log_from_row(row: &SqliteRow) -> Result<ModLogEntry> {
    let action: String = row.get("action");
    Ok(ModLogEntry {
        id: row.get("id"),
        applicant: UserId::new(row.get::<i64, _>("applicant_id") as u64),
        moderator: UserId::new(row.get::<i64, _>("moderator_id") as u64),
        action: action.parse()?,
        reason: row.get("reason"),
        timestamp_ms: row.get::<i64, _>("timestamp_ms") as u64,
    })
}

#[async_trait]
impl SanctionStore for SqliteSanctionStore {
    async fn save_action(&self, action: &PendingAction) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO pending_actions
                (id, applicant_id, kind, roles_to_remove, roles_to_add, expires_at_ms)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.id)
        .bind(action.applicant.get() as i64)
        .bind(action.kind.as_str())
        .bind(encode_roles(&action.roles_to_remove)?)
        .bind(encode_roles(&action.roles_to_add)?)
        .bind(action.expires_at_ms as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Error::AlreadyActive {
                    applicant: action.applicant,
                })
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_action(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_actions(&self) -> Result<Vec<PendingAction>> {
        let rows = sqlx::query("SELECT * FROM pending_actions ORDER BY expires_at_ms")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(action_from_row).collect()
    }

    async fn action_for(&self, applicant: UserId) -> Result<Option<PendingAction>> {
        let row = sqlx::query("SELECT * FROM pending_actions WHERE applicant_id = ?")
            .bind(applicant.get() as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(action_from_row).transpose()
    }

    async fn add_mod_log(&self, entry: &NewModLogEntry) -> Result<ModLogEntry> {
        let result = sqlx::query(
            "INSERT INTO mod_log (applicant_id, moderator_id, action, reason, timestamp_ms)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.applicant.get() as i64)
        .bind(entry.moderator.get() as i64)
        .bind(entry.action.as_str())
        .bind(&entry.reason)
        .bind(entry.timestamp_ms as i64)
        .execute(&self.pool)
        .await?;

        Ok(ModLogEntry {
            id: result.last_insert_rowid(),
            applicant: entry.applicant,
            moderator: entry.moderator,
            action: entry.action,
            reason: entry.reason.clone(),
            timestamp_ms: entry.timestamp_ms,
        })
    }

    async fn mod_logs(&self, applicant: UserId) -> Result<Vec<ModLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM mod_log WHERE applicant_id = ? ORDER BY timestamp_ms DESC, id DESC",
        )
        .bind(applicant.get() as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mod_log_from_row).collect()
    }
}
