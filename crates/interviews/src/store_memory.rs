//! In-memory store for testing.

use std::{collections::HashMap, sync::Mutex};

use {
    async_trait::async_trait,
    gatehouse_common::{ChannelId, UserId},
};

use crate::{Result, store::InterviewStore, types::InterviewRecord};

/// In-memory store keyed by applicant. No persistence.
#[derive(Default)]
pub struct InMemoryInterviewStore {
    records: Mutex<HashMap<UserId, InterviewRecord>>,
}

impl InMemoryInterviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterviewStore for InMemoryInterviewStore {
    async fn create_interview(&self, record: &InterviewRecord) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&record.applicant) {
            return Ok(false);
        }
        records.insert(record.applicant, record.clone());
        Ok(true)
    }

    async fn get_interview(&self, applicant: UserId) -> Result<Option<InterviewRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&applicant).cloned())
    }

    async fn get_interview_by_channel(
        &self,
        channel: ChannelId,
    ) -> Result<Option<InterviewRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().find(|r| r.channel == channel).cloned())
    }

    async fn set_question(&self, channel: ChannelId, index: usize) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = records.values_mut().find(|r| r.channel == channel) {
            record.current_question = index;
        }
        Ok(())
    }

    async fn delete_interview(&self, channel: ChannelId) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let before = records.len();
        records.retain(|_, r| r.channel != channel);
        Ok(records.len() != before)
    }

    async fn list_interviews(&self) -> Result<Vec<InterviewRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().cloned().collect())
    }
}
