//! Interview records and archival task types.

use {
    gatehouse_common::{ChannelId, MessageId, UserId},
    serde::{Deserialize, Serialize},
};

/// One open interview. At most one exists per applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewRecord {
    pub applicant: UserId,
    pub channel: ChannelId,
    /// The message whose reaction advances the questions.
    pub welcome_message: MessageId,
    /// Index of the next question to send. Never decreases and never
    /// exceeds the number of configured questions.
    pub current_question: usize,
}

/// How an interview ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
    /// The applicant left before a decision.
    Left,
    /// A moderator archived the channel without a decision.
    Manual,
}

/// One archival sequence. Lives only while the worker runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalTask {
    pub channel: ChannelId,
    /// `None` when a channel is archived without a tracked record.
    pub applicant: Option<UserId>,
    pub remove_applicant: bool,
    pub decision: Decision,
}

/// What an archival sequence managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivalReport {
    /// Stages skipped after a failure, in order.
    pub skipped_stages: Vec<&'static str>,
    pub applicant_removed: bool,
    pub messages_relayed: usize,
    pub channel_deleted: bool,
    pub record_deleted: bool,
}

/// Result of handling a join (or the manual create command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Created(InterviewRecord),
    /// A record was already open; nothing new was created.
    Existing(InterviewRecord),
}

impl JoinOutcome {
    #[must_use]
    pub fn record(&self) -> &InterviewRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }
}

/// Result of a reaction on an interview channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Question at `index` was sent.
    Advanced { index: usize },
    /// Every question has been sent already.
    Exhausted,
    /// Not the applicant, not the welcome message, or not an interview.
    Ignored,
}

/// Fill `{mention}` and `{guild}` placeholders in a configured message.
#[must_use]
pub fn render_template(template: &str, applicant: UserId, guild_name: &str) -> String {
    template
        .replace("{mention}", &applicant.mention())
        .replace("{guild}", guild_name)
}
