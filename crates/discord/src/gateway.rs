//! Outbound Discord calls over serenity's REST client.

use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    dashmap::DashMap,
    gatehouse_channels::{
        ChannelSpec, Error, HistoryMessage, Identity, MemberInfo, NotificationGateway, Result,
    },
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
    serenity::{
        all::{
            ChannelType, CreateChannel, CreateMessage, CreateWebhook, EditMessage,
            ExecuteWebhook, GetMessages, GuildId, Http, Message, Webhook,
        },
        http::HttpError,
    },
    tracing::debug,
};

use crate::convert::{self, map_error};

/// Discord caps a history page at 100 messages.
const HISTORY_PAGE: u8 = 100;

const RELAY_WEBHOOK_NAME: &str = "gatehouse transcripts";

/// [`NotificationGateway`] for one guild.
pub struct DiscordGateway {
    http: Arc<Http>,
    guild: GuildId,
    bot: UserId,
    /// Relay webhooks by channel, created on first use.
    webhooks: DashMap<ChannelId, Webhook>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>, guild: GuildId, bot: UserId) -> Self {
        Self {
            http,
            guild,
            bot,
            webhooks: DashMap::new(),
        }
    }

    /// Resolve the bot's own user id, then build the gateway.
    pub async fn connect(http: Arc<Http>, guild: GuildId) -> Result<Self> {
        let me = http
            .get_current_user()
            .await
            .map_err(|e| map_error("current user", e))?;
        Ok(Self::new(http, guild, UserId::new(me.id.get())))
    }

    async fn relay_webhook(&self, channel: ChannelId) -> Result<Webhook> {
        if let Some(hook) = self.webhooks.get(&channel) {
            return Ok(hook.clone());
        }
        let target = convert::channel(channel)?;
        let existing = target
            .webhooks(&self.http)
            .await
            .map_err(|e| map_error("list webhooks", e))?
            .into_iter()
            .find(|w| w.name.as_deref() == Some(RELAY_WEBHOOK_NAME) && w.token.is_some());
        let hook = match existing {
            Some(hook) => hook,
            None => {
                debug!(channel_id = %channel, "creating relay webhook");
                target
                    .create_webhook(&self.http, CreateWebhook::new(RELAY_WEBHOOK_NAME))
                    .await
                    .map_err(|e| map_error("create webhook", e))?
            },
        };
        self.webhooks.insert(channel, hook.clone());
        Ok(hook)
    }

    /// Position and managed flag of every guild role.
    async fn role_table(&self) -> Result<HashMap<u64, (u16, bool)>> {
        let roles = self
            .guild
            .roles(&self.http)
            .await
            .map_err(|e| map_error("guild roles", e))?;
        Ok(roles
            .into_iter()
            .map(|(id, role)| (id.get(), (role.position, role.managed)))
            .collect())
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

fn history_entry(message: &Message) -> HistoryMessage {
    HistoryMessage {
        id: MessageId::new(message.id.get()),
        author_id: UserId::new(message.author.id.get()),
        author: Identity {
            display_name: message.author.display_name().to_string(),
            avatar_url: Some(message.author.face()),
        },
        content: message.content.clone(),
    }
}

#[async_trait]
impl NotificationGateway for DiscordGateway {
    fn bot_user_id(&self) -> UserId {
        self.bot
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageId> {
        let sent = convert::channel(channel)?
            .send_message(&self.http, CreateMessage::new().content(content))
            .await
            .map_err(|e| map_error("send message", e))?;
        Ok(MessageId::new(sent.id.get()))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<()> {
        convert::channel(channel)?
            .edit_message(
                &self.http,
                convert::message(message)?,
                EditMessage::new().content(content),
            )
            .await
            .map_err(|e| map_error("edit message", e))?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        convert::channel(channel)?
            .delete_message(&self.http, convert::message(message)?)
            .await
            .map_err(|e| map_error("delete message", e))
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<()> {
        convert::channel(channel)?
            .create_reaction(&self.http, convert::message(message)?, convert::reaction(emoji)?)
            .await
            .map_err(|e| map_error("add reaction", e))
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: &str,
    ) -> Result<()> {
        convert::channel(channel)?
            .delete_reaction(
                &self.http,
                convert::message(message)?,
                Some(convert::user(user)?),
                convert::reaction(emoji)?,
            )
            .await
            .map_err(|e| map_error("remove reaction", e))
    }

    async fn grant_role(&self, user: UserId, role: RoleId, reason: &str) -> Result<()> {
        self.http
            .add_member_role(
                self.guild,
                convert::user(user)?,
                convert::role(role)?,
                Some(reason),
            )
            .await
            .map_err(|e| map_error("grant role", e))
    }

    async fn revoke_role(&self, user: UserId, role: RoleId, reason: &str) -> Result<()> {
        self.http
            .remove_member_role(
                self.guild,
                convert::user(user)?,
                convert::role(role)?,
                Some(reason),
            )
            .await
            .map_err(|e| map_error("revoke role", e))
    }

    async fn remove_member(&self, user: UserId, reason: &str) -> Result<()> {
        self.guild
            .kick_with_reason(&self.http, convert::user(user)?, reason)
            .await
            .map_err(|e| map_error("remove member", e))
    }

    async fn send_direct(&self, user: UserId, content: &str) -> Result<()> {
        convert::user(user)?
            .direct_message(&self.http, CreateMessage::new().content(content))
            .await
            .map_err(|e| map_error("direct message", e))?;
        Ok(())
    }

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelId> {
        let overwrites = spec
            .overwrites
            .iter()
            .map(|o| convert::overwrite(self.guild, o))
            .collect::<Result<Vec<_>>>()?;
        let mut builder = CreateChannel::new(spec.name.as_str())
            .kind(ChannelType::Text)
            .permissions(overwrites)
            .audit_log_reason(&spec.reason);
        if let Some(category) = spec.category {
            builder = builder.category(convert::channel(category)?);
        }
        let created = self
            .guild
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| map_error("create channel", e))?;
        Ok(ChannelId::new(created.id.get()))
    }

    async fn delete_channel(&self, channel: ChannelId, reason: &str) -> Result<()> {
        self.http
            .delete_channel(convert::channel(channel)?, Some(reason))
            .await
            .map_err(|e| map_error("delete channel", e))?;
        self.webhooks.remove(&channel);
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        let target = convert::channel(channel)?;
        let mut collected: Vec<Message> = Vec::new();
        while collected.len() < limit {
            let page_size = (limit - collected.len()).min(usize::from(HISTORY_PAGE));
            let mut request = GetMessages::new().limit(page_size as u8);
            if let Some(oldest) = collected.last() {
                request = request.before(oldest.id);
            }
            let page = target
                .messages(&self.http, request)
                .await
                .map_err(|e| map_error("fetch history", e))?;
            let exhausted = page.len() < page_size;
            collected.extend(page);
            if exhausted {
                break;
            }
        }
        // Discord returns newest first.
        Ok(collected.iter().rev().map(history_entry).collect())
    }

    async fn relay_as_identity(
        &self,
        channel: ChannelId,
        identity: &Identity,
        content: &str,
    ) -> Result<()> {
        let hook = self.relay_webhook(channel).await?;
        let mut builder = ExecuteWebhook::new()
            .content(content)
            .username(identity.display_name.as_str());
        if let Some(avatar) = &identity.avatar_url {
            builder = builder.avatar_url(avatar.as_str());
        }
        let result = hook.execute(&self.http, false, builder).await;
        if let Err(e) = result {
            // A deleted webhook is recreated on the next relay.
            if is_not_found(&e) {
                self.webhooks.remove(&channel);
            }
            return Err(map_error("relay message", e));
        }
        Ok(())
    }

    async fn member(&self, user: UserId) -> Result<Option<MemberInfo>> {
        let member = match self.guild.member(&self.http, convert::user(user)?).await {
            Ok(member) => member,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(map_error("fetch member", e)),
        };
        let table = self.role_table().await?;
        let top_role_position = member
            .roles
            .iter()
            .filter_map(|r| table.get(&r.get()).map(|(position, _)| *position))
            .max()
            .map_or(0, i64::from);
        let managed_roles = member
            .roles
            .iter()
            .filter(|r| table.get(&r.get()).is_some_and(|(_, managed)| *managed))
            .map(|r| RoleId::new(r.get()))
            .collect();
        Ok(Some(MemberInfo {
            user_id: user,
            username: member.user.name.clone(),
            display_name: member.display_name().to_string(),
            avatar_url: Some(member.face()),
            roles: member.roles.iter().map(|r| RoleId::new(r.get())).collect(),
            top_role_position,
            managed_roles,
        }))
    }

    async fn user_identity(&self, user: UserId) -> Result<Identity> {
        let found = convert::user(user)?
            .to_user(&self.http)
            .await
            .map_err(|e| match e {
                e if is_not_found(&e) => Error::gone(format!("user {user}")),
                e => map_error("fetch user", e),
            })?;
        Ok(Identity {
            display_name: found.display_name().to_string(),
            avatar_url: Some(found.face()),
        })
    }
}
