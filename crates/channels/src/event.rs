use std::collections::BTreeSet;

use {
    async_trait::async_trait,
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
};

/// A chat message that may carry a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: ChannelId,
    pub message: MessageId,
    pub author: UserId,
    /// Roles held by the author at the time the message was sent.
    pub author_roles: BTreeSet<RoleId>,
    pub content: String,
}

/// Events delivered by the platform transport, already scoped to the
/// configured guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    MemberJoined {
        user: UserId,
    },
    MemberLeft {
        user: UserId,
        username: String,
    },
    ReactionAdded {
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: String,
    },
    Message(InboundMessage),
}

impl InboundEvent {
    /// Short name for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MemberJoined { .. } => "member_joined",
            Self::MemberLeft { .. } => "member_left",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::Message(_) => "message",
        }
    }
}

/// Receiver for inbound events. The dispatcher implements this; the
/// transport calls it once per event and never sees handler errors.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, event: InboundEvent);
}
