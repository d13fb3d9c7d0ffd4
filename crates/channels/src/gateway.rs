use std::collections::BTreeSet;

use {
    async_trait::async_trait,
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Display identity a relayed message is posted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Guild member as seen by the workflow and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Roles held, excluding the implicit default role.
    pub roles: BTreeSet<RoleId>,
    /// Position of the highest role held; 0 when the member only has the
    /// default role.
    pub top_role_position: i64,
    /// Held roles assigned by an integration (boosts, bots). These cannot
    /// be granted or revoked by hand.
    pub managed_roles: BTreeSet<RoleId>,
}

impl MemberInfo {
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// One message of a channel's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub author: Identity,
    pub content: String,
}

/// Channel permission a single overwrite can allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    View,
    Send,
    React,
    ReadHistory,
    ManageMessages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Member(UserId),
    Role(RoleId),
    /// The guild's default role.
    Everyone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: Vec<Access>,
    pub deny: Vec<Access>,
}

/// Everything needed to create an interview channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub category: Option<ChannelId>,
    pub overwrites: Vec<Overwrite>,
    pub reason: String,
}

/// Outbound capability object for the chat platform.
///
/// Every call may fail transiently; calls against a vanished channel, member
/// or message fail with [`crate::Error::Gone`]. Role grants and revocations
/// are idempotent: granting a held role or revoking an absent one succeeds.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// The bot's own user id.
    fn bot_user_id(&self) -> UserId;

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageId>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<()>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()>;

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str)
    -> Result<()>;

    /// Remove `user`'s reaction so the same emoji can be clicked again.
    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: &str,
    ) -> Result<()>;

    async fn grant_role(&self, user: UserId, role: RoleId, reason: &str) -> Result<()>;

    async fn revoke_role(&self, user: UserId, role: RoleId, reason: &str) -> Result<()>;

    /// Kick the member from the guild.
    async fn remove_member(&self, user: UserId, reason: &str) -> Result<()>;

    /// Direct message a user.
    async fn send_direct(&self, user: UserId, content: &str) -> Result<()>;

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelId>;

    async fn delete_channel(&self, channel: ChannelId, reason: &str) -> Result<()>;

    /// Most recent `limit` messages, oldest first.
    async fn fetch_history(&self, channel: ChannelId, limit: usize)
    -> Result<Vec<HistoryMessage>>;

    /// Post `content` into `channel` under someone else's name and avatar.
    async fn relay_as_identity(
        &self,
        channel: ChannelId,
        identity: &Identity,
        content: &str,
    ) -> Result<()>;

    /// Look up a guild member. `Ok(None)` when the user is not in the guild.
    async fn member(&self, user: UserId) -> Result<Option<MemberInfo>>;

    /// Display identity of any user, member or not.
    async fn user_identity(&self, user: UserId) -> Result<Identity>;
}
