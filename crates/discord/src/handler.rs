//! Discord event handler for serenity.
//!
//! Implements the EventHandler trait and forwards events from the
//! configured guild to the [`EventSink`].

use std::sync::Arc;

use {
    gatehouse_channels::{EventSink, InboundEvent, InboundMessage},
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
    serenity::{
        all::{
            Context, EventHandler, GatewayIntents, GuildId, Member, Message, Reaction, Ready,
            User,
        },
        async_trait,
    },
    tracing::{debug, info},
};

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    pub guild: GuildId,
    pub sink: Arc<dyn EventSink>,
}

impl DiscordHandler {
    /// Required gateway intents for the bot. `GUILD_MEMBERS` and
    /// `MESSAGE_CONTENT` are privileged and must be enabled for the
    /// application.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_MESSAGE_REACTIONS
            | GatewayIntents::MESSAGE_CONTENT
    }

    fn in_scope(&self, guild: Option<GuildId>) -> bool {
        guild == Some(self.guild)
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
        if !ready.guilds.iter().any(|g| g.id == self.guild) {
            info!(guild_id = %self.guild, "bot is not in the configured guild yet");
        }
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        if !self.in_scope(Some(new_member.guild_id)) || new_member.user.bot {
            return;
        }
        self.sink
            .dispatch(InboundEvent::MemberJoined {
                user: UserId::new(new_member.user.id.get()),
            })
            .await;
    }

    async fn guild_member_removal(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        if !self.in_scope(Some(guild_id)) || user.bot {
            return;
        }
        self.sink
            .dispatch(InboundEvent::MemberLeft {
                user: UserId::new(user.id.get()),
                username: user.name,
            })
            .await;
    }

    async fn reaction_add(&self, _ctx: Context, add_reaction: Reaction) {
        if !self.in_scope(add_reaction.guild_id) {
            return;
        }
        let Some(user) = add_reaction.user_id else {
            debug!("reaction without user id");
            return;
        };
        self.sink
            .dispatch(InboundEvent::ReactionAdded {
                channel: ChannelId::new(add_reaction.channel_id.get()),
                message: MessageId::new(add_reaction.message_id.get()),
                user: UserId::new(user.get()),
                emoji: add_reaction.emoji.to_string(),
            })
            .await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Skip bot messages to prevent loops
        if msg.author.bot || !self.in_scope(msg.guild_id) {
            return;
        }

        let author_roles = msg
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| RoleId::new(r.get())).collect())
            .unwrap_or_default();

        self.sink
            .dispatch(InboundEvent::Message(InboundMessage {
                channel: ChannelId::new(msg.channel_id.get()),
                message: MessageId::new(msg.id.get()),
                author: UserId::new(msg.author.id.get()),
                author_roles,
                content: msg.content,
            }))
            .await;
    }

    async fn cache_ready(&self, _ctx: Context, guilds: Vec<GuildId>) {
        debug!(guild_count = guilds.len(), "discord cache ready");
    }
}
