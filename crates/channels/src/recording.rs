//! In-memory [`NotificationGateway`] that records every outbound call.
//!
//! Members, channels and message history live in a small simulated guild,
//! so calls against something that was never created (or was removed) fail
//! with [`Error::Gone`] the way the real platform answers 404s. Failures can
//! also be injected per operation with [`RecordingGateway::fail_next`].

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
};

use crate::{
    Error, Result,
    gateway::{ChannelSpec, HistoryMessage, Identity, MemberInfo, NotificationGateway},
};

/// One recorded outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    SendMessage {
        channel: ChannelId,
        content: String,
    },
    EditMessage {
        channel: ChannelId,
        message: MessageId,
        content: String,
    },
    DeleteMessage {
        channel: ChannelId,
        message: MessageId,
    },
    AddReaction {
        channel: ChannelId,
        message: MessageId,
        emoji: String,
    },
    RemoveReaction {
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: String,
    },
    GrantRole {
        user: UserId,
        role: RoleId,
    },
    RevokeRole {
        user: UserId,
        role: RoleId,
    },
    RemoveMember {
        user: UserId,
    },
    SendDirect {
        user: UserId,
        content: String,
    },
    CreateChannel {
        name: String,
    },
    DeleteChannel {
        channel: ChannelId,
    },
    FetchHistory {
        channel: ChannelId,
        limit: usize,
    },
    Relay {
        channel: ChannelId,
        display_name: String,
        content: String,
    },
}

impl GatewayCall {
    /// Operation name, as accepted by [`RecordingGateway::fail_next`].
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::AddReaction { .. } => "add_reaction",
            Self::RemoveReaction { .. } => "remove_reaction",
            Self::GrantRole { .. } => "grant_role",
            Self::RevokeRole { .. } => "revoke_role",
            Self::RemoveMember { .. } => "remove_member",
            Self::SendDirect { .. } => "send_direct",
            Self::CreateChannel { .. } => "create_channel",
            Self::DeleteChannel { .. } => "delete_channel",
            Self::FetchHistory { .. } => "fetch_history",
            Self::Relay { .. } => "relay_as_identity",
        }
    }

    /// Channel the call targets, if any.
    #[must_use]
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Self::SendMessage { channel, .. }
            | Self::EditMessage { channel, .. }
            | Self::DeleteMessage { channel, .. }
            | Self::AddReaction { channel, .. }
            | Self::RemoveReaction { channel, .. }
            | Self::DeleteChannel { channel }
            | Self::FetchHistory { channel, .. }
            | Self::Relay { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Gone,
    /// A permanent refusal, as for a missing permission.
    Rejected,
}

#[derive(Default)]
struct State {
    calls: Vec<GatewayCall>,
    members: HashMap<UserId, MemberInfo>,
    /// Identities of users that left, so DMs and transcripts still resolve.
    former_members: HashMap<UserId, Identity>,
    channels: HashMap<ChannelId, Vec<HistoryMessage>>,
    created: Vec<ChannelSpec>,
    failures: HashMap<&'static str, VecDeque<FailureKind>>,
    next_id: u64,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record `call` and pop an injected failure for it, if one is queued.
    fn begin(&mut self, call: GatewayCall) -> Result<()> {
        let op = call.op();
        self.calls.push(call);
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(FailureKind::Transient) => Err(Error::unavailable(format!("injected {op}"))),
            Some(FailureKind::Gone) => Err(Error::gone(format!("injected {op} target"))),
            Some(FailureKind::Rejected) => Err(Error::external(
                op,
                std::io::Error::other("injected refusal"),
            )),
            None => Ok(()),
        }
    }

    fn history_mut(&mut self, channel: ChannelId) -> Result<&mut Vec<HistoryMessage>> {
        self.channels
            .get_mut(&channel)
            .ok_or_else(|| Error::gone(format!("channel {channel}")))
    }

    fn message_mut(
        &mut self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<&mut HistoryMessage> {
        self.history_mut(channel)?
            .iter_mut()
            .find(|m| m.id == message)
            .ok_or_else(|| Error::gone(format!("message {message}")))
    }

    fn member_mut(&mut self, user: UserId) -> Result<&mut MemberInfo> {
        self.members
            .get_mut(&user)
            .ok_or_else(|| Error::gone(format!("member {user}")))
    }
}

fn refuse_managed(member: &MemberInfo, role: RoleId) -> Result<()> {
    if member.managed_roles.contains(&role) {
        return Err(Error::external(
            "role change",
            std::io::Error::other(format!("role {role} is managed by an integration")),
        ));
    }
    Ok(())
}

/// Simulated guild that records outbound calls in order.
pub struct RecordingGateway {
    bot: UserId,
    state: Mutex<State>,
}

impl RecordingGateway {
    pub fn new(bot: UserId) -> Self {
        Self {
            bot,
            state: Mutex::new(State {
                next_id: 10_000,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bot_identity() -> Identity {
        Identity {
            display_name: "gatehouse".into(),
            avatar_url: None,
        }
    }

    /// Put a member into the simulated guild.
    pub fn add_member(&self, member: MemberInfo) {
        let mut state = self.lock();
        state.former_members.remove(&member.user_id);
        state.members.insert(member.user_id, member);
    }

    /// Make a member disappear without recording a call, as if they left.
    pub fn drop_member(&self, user: UserId) {
        let mut state = self.lock();
        if let Some(member) = state.members.remove(&user) {
            state.former_members.insert(user, member.identity());
        }
    }

    /// Create a channel without recording a call.
    pub fn add_channel(&self) -> ChannelId {
        let mut state = self.lock();
        let id = ChannelId::new(state.allocate_id());
        state.channels.insert(id, Vec::new());
        id
    }

    /// Make a channel disappear without recording a call.
    pub fn drop_channel(&self, channel: ChannelId) {
        self.lock().channels.remove(&channel);
    }

    /// Append a message authored by `author` to a channel's history.
    pub fn post(&self, channel: ChannelId, author: UserId, content: &str) -> Option<MessageId> {
        let mut state = self.lock();
        let identity = state
            .members
            .get(&author)
            .map(MemberInfo::identity)
            .or_else(|| state.former_members.get(&author).cloned())
            .unwrap_or_else(|| Identity {
                display_name: author.to_string(),
                avatar_url: None,
            });
        let id = MessageId::new(state.allocate_id());
        state.channels.get_mut(&channel)?.push(HistoryMessage {
            id,
            author_id: author,
            author: identity,
            content: content.into(),
        });
        Some(id)
    }

    /// Fail the next call of `op` (see [`GatewayCall::op`]).
    pub fn fail_next(&self, op: &'static str, kind: FailureKind) {
        self.lock().failures.entry(op).or_default().push_back(kind);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, op: &str) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn roles_of(&self, user: UserId) -> Option<BTreeSet<RoleId>> {
        self.lock().members.get(&user).map(|m| m.roles.clone())
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.lock().members.contains_key(&user)
    }

    pub fn channel_exists(&self, channel: ChannelId) -> bool {
        self.lock().channels.contains_key(&channel)
    }

    pub fn messages(&self, channel: ChannelId) -> Vec<HistoryMessage> {
        self.lock()
            .channels
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Specs of every channel created through the gateway.
    pub fn created_channels(&self) -> Vec<ChannelSpec> {
        self.lock().created.clone()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    fn bot_user_id(&self) -> UserId {
        self.bot
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageId> {
        let mut state = self.lock();
        state.begin(GatewayCall::SendMessage {
            channel,
            content: content.into(),
        })?;
        let id = MessageId::new(state.allocate_id());
        let bot = self.bot;
        state.history_mut(channel)?.push(HistoryMessage {
            id,
            author_id: bot,
            author: Self::bot_identity(),
            content: content.into(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::EditMessage {
            channel,
            message,
            content: content.into(),
        })?;
        state.message_mut(channel, message)?.content = content.into();
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::DeleteMessage { channel, message })?;
        let history = state.history_mut(channel)?;
        let before = history.len();
        history.retain(|m| m.id != message);
        if history.len() == before {
            return Err(Error::gone(format!("message {message}")));
        }
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::AddReaction {
            channel,
            message,
            emoji: emoji.into(),
        })?;
        state.message_mut(channel, message).map(|_| ())
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::RemoveReaction {
            channel,
            message,
            user,
            emoji: emoji.into(),
        })?;
        state.message_mut(channel, message).map(|_| ())
    }

    async fn grant_role(&self, user: UserId, role: RoleId, _reason: &str) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::GrantRole { user, role })?;
        let member = state.member_mut(user)?;
        refuse_managed(member, role)?;
        member.roles.insert(role);
        Ok(())
    }

    async fn revoke_role(&self, user: UserId, role: RoleId, _reason: &str) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::RevokeRole { user, role })?;
        let member = state.member_mut(user)?;
        refuse_managed(member, role)?;
        member.roles.remove(&role);
        Ok(())
    }

    async fn remove_member(&self, user: UserId, _reason: &str) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::RemoveMember { user })?;
        let member = state
            .members
            .remove(&user)
            .ok_or_else(|| Error::gone(format!("member {user}")))?;
        state.former_members.insert(user, member.identity());
        Ok(())
    }

    async fn send_direct(&self, user: UserId, content: &str) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::SendDirect {
            user,
            content: content.into(),
        })?;
        if state.members.contains_key(&user) || state.former_members.contains_key(&user) {
            Ok(())
        } else {
            Err(Error::gone(format!("user {user}")))
        }
    }

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelId> {
        let mut state = self.lock();
        state.begin(GatewayCall::CreateChannel {
            name: spec.name.clone(),
        })?;
        let id = ChannelId::new(state.allocate_id());
        state.channels.insert(id, Vec::new());
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn delete_channel(&self, channel: ChannelId, _reason: &str) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::DeleteChannel { channel })?;
        state
            .channels
            .remove(&channel)
            .map(|_| ())
            .ok_or_else(|| Error::gone(format!("channel {channel}")))
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let mut state = self.lock();
        state.begin(GatewayCall::FetchHistory { channel, limit })?;
        let history = state.history_mut(channel)?;
        let skip = history.len().saturating_sub(limit);
        Ok(history[skip..].to_vec())
    }

    async fn relay_as_identity(
        &self,
        channel: ChannelId,
        identity: &Identity,
        content: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.begin(GatewayCall::Relay {
            channel,
            display_name: identity.display_name.clone(),
            content: content.into(),
        })?;
        let id = MessageId::new(state.allocate_id());
        state.history_mut(channel)?.push(HistoryMessage {
            id,
            author_id: UserId::default(),
            author: identity.clone(),
            content: content.into(),
        });
        Ok(())
    }

    async fn member(&self, user: UserId) -> Result<Option<MemberInfo>> {
        Ok(self.lock().members.get(&user).cloned())
    }

    async fn user_identity(&self, user: UserId) -> Result<Identity> {
        let state = self.lock();
        state
            .members
            .get(&user)
            .map(MemberInfo::identity)
            .or_else(|| state.former_members.get(&user).cloned())
            .ok_or_else(|| Error::gone(format!("user {user}")))
    }
}
