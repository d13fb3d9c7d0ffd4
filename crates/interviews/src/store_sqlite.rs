//! SQLite-backed interview store using sqlx.

use {
    async_trait::async_trait,
    gatehouse_common::{ChannelId, MessageId, UserId},
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{Result, store::InterviewStore, types::InterviewRecord};

pub struct SqliteInterviewStore {
    pool: SqlitePool,
}

impl SqliteInterviewStore {
    /// Create a store using an existing pool.
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &SqliteRow) -> InterviewRecord {
    InterviewRecord {
        applicant: UserId::new(row.get::<i64, _>("applicant_id") as u64),
        channel: ChannelId::new(row.get::<i64, _>("channel_id") as u64),
        welcome_message: MessageId::new(row.get::<i64, _>("welcome_message_id") as u64),
        current_question: row.get::<i64, _>("current_question") as usize,
    }
}

#[async_trait]
impl InterviewStore for SqliteInterviewStore {
    async fn create_interview(&self, record: &InterviewRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO interviews
                (applicant_id, channel_id, welcome_message_id, current_question)
             VALUES (?, ?, ?, ?)",
        )
        .bind(record.applicant.get() as i64)
        .bind(record.channel.get() as i64)
        .bind(record.welcome_message.get() as i64)
        .bind(record.current_question as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_interview(&self, applicant: UserId) -> Result<Option<InterviewRecord>> {
        let row = sqlx::query("SELECT * FROM interviews WHERE applicant_id = ?")
            .bind(applicant.get() as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn get_interview_by_channel(
        &self,
        channel: ChannelId,
    ) -> Result<Option<InterviewRecord>> {
        let row = sqlx::query("SELECT * FROM interviews WHERE channel_id = ?")
            .bind(channel.get() as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn set_question(&self, channel: ChannelId, index: usize) -> Result<()> {
        sqlx::query("UPDATE interviews SET current_question = ? WHERE channel_id = ?")
            .bind(index as i64)
            .bind(channel.get() as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_interview(&self, channel: ChannelId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM interviews WHERE channel_id = ?")
            .bind(channel.get() as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_interviews(&self) -> Result<Vec<InterviewRecord>> {
        let rows = sqlx::query("SELECT * FROM interviews ORDER BY applicant_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}
