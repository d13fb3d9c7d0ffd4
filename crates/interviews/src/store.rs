//! Persistence trait for interview records.

use {
    async_trait::async_trait,
    gatehouse_common::{ChannelId, UserId},
};

use crate::{Result, types::InterviewRecord};

/// Persistence backend for open interviews.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Insert `record` unless the applicant already has one. Returns
    /// `false` (and stores nothing) in that case.
    async fn create_interview(&self, record: &InterviewRecord) -> Result<bool>;

    async fn get_interview(&self, applicant: UserId) -> Result<Option<InterviewRecord>>;

    async fn get_interview_by_channel(&self, channel: ChannelId)
    -> Result<Option<InterviewRecord>>;

    /// Store the next question index for the interview in `channel`.
    async fn set_question(&self, channel: ChannelId, index: usize) -> Result<()>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_interview(&self, channel: ChannelId) -> Result<bool>;

    async fn list_interviews(&self) -> Result<Vec<InterviewRecord>>;
}
