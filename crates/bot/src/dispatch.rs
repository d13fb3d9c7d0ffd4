//! Routes inbound events to the registered subsystems.

use std::{collections::BTreeSet, sync::Arc};

use {
    async_trait::async_trait,
    gatehouse_channels::{EventSink, InboundEvent, InboundMessage, NotificationGateway},
    gatehouse_common::{RoleId, UserId},
    gatehouse_interviews::{InterviewWorkflow, JoinOutcome},
    gatehouse_sanctions::{
        moderation::{ModLogPage, Moderation},
        parse::humanize,
    },
    tracing::{debug, info, warn},
};

use crate::command::{Command, parse_command};

#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub prefixes: Vec<String>,
    /// Holding any of these roles allows running commands.
    pub mod_roles: BTreeSet<RoleId>,
}

/// The single [`EventSink`] the transport feeds.
///
/// Subsystems are registered explicitly; events and commands for a
/// subsystem that was not registered are ignored.
pub struct Dispatcher {
    gateway: Arc<dyn NotificationGateway>,
    config: DispatchConfig,
    interviews: Option<Arc<InterviewWorkflow>>,
    moderation: Option<Arc<Moderation>>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn NotificationGateway>, config: DispatchConfig) -> Self {
        Self {
            gateway,
            config,
            interviews: None,
            moderation: None,
        }
    }

    #[must_use]
    pub fn with_interviews(mut self, workflow: Arc<InterviewWorkflow>) -> Self {
        self.interviews = Some(workflow);
        self
    }

    #[must_use]
    pub fn with_moderation(mut self, moderation: Arc<Moderation>) -> Self {
        self.moderation = Some(moderation);
        self
    }

    async fn on_message(&self, message: &InboundMessage) {
        let bot = self.gateway.bot_user_id();
        if message.author == bot {
            return;
        }

        let command = match parse_command(&message.content, &self.config.prefixes, bot) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                self.reply(message, &gatehouse_common::Error::from(e).user_reply())
                    .await;
                return;
            },
        };

        let registered = if command.is_interview() {
            self.interviews.is_some()
        } else {
            self.moderation.is_some()
        };
        if !registered {
            debug!(command = command.name(), "subsystem disabled, command ignored");
            return;
        }

        let text = match self.run(command, message).await {
            Ok(text) => text,
            Err(e) => e.user_reply(),
        };
        self.reply(message, &text).await;
    }

    async fn run(
        &self,
        command: Command,
        message: &InboundMessage,
    ) -> gatehouse_common::Result<String> {
        if message.author_roles.is_disjoint(&self.config.mod_roles) {
            return Err(gatehouse_common::Error::permission_denied(
                "a moderator role is required",
            ));
        }
        info!(command = command.name(), author_id = %message.author, channel_id = %message.channel, "running command");

        let moderator = message.author;
        let channel = message.channel;
        match command {
            Command::InterviewCreate { applicant } => {
                let outcome = self.interviews()?.on_applicant_joined(applicant).await?;
                Ok(match outcome {
                    JoinOutcome::Created(record) => format!(
                        "Opened an interview for {} in {}.",
                        applicant.mention(),
                        record.channel.mention()
                    ),
                    JoinOutcome::Existing(record) => format!(
                        "{} already has an interview in {}.",
                        applicant.mention(),
                        record.channel.mention()
                    ),
                })
            },
            Command::InterviewApprove => {
                self.interviews()?.approve(channel, moderator).await?;
                Ok("Interview approved. This channel will be archived.".into())
            },
            Command::InterviewDeny => {
                self.interviews()?.deny(channel, moderator).await?;
                Ok("Interview denied. This channel will be archived.".into())
            },
            Command::InterviewManualArchive => {
                self.interviews()?.manual_archive(channel, moderator).await?;
                Ok("Archiving this channel.".into())
            },
            Command::Mute {
                target,
                duration,
                reason,
            } => {
                self.moderation()?
                    .mute(moderator, target, duration, &reason)
                    .await?;
                Ok(format!(
                    "Muted {} for {}. Reason: {reason}",
                    target.mention(),
                    humanize(duration)
                ))
            },
            Command::Hardmute {
                target,
                duration,
                reason,
            } => {
                self.moderation()?
                    .hardmute(moderator, target, duration, &reason)
                    .await?;
                Ok(format!(
                    "Hardmuted {} for {}. Reason: {reason}",
                    target.mention(),
                    humanize(duration)
                ))
            },
            Command::Unmute { target, reason } => {
                self.moderation()?.unmute(moderator, target, &reason).await?;
                Ok(format!("Unmuted {}.", target.mention()))
            },
            Command::Warn { target, reason } => {
                self.moderation()?.warn(moderator, target, &reason).await?;
                Ok(format!("Warned {}. Reason: {reason}", target.mention()))
            },
            Command::ModLogs { target, page } => {
                let page = self.moderation()?.mod_logs(target, page).await?;
                Ok(format_mod_logs(target, &page))
            },
        }
    }

    fn interviews(&self) -> gatehouse_common::Result<&InterviewWorkflow> {
        self.interviews
            .as_deref()
            .ok_or_else(|| gatehouse_common::Error::not_found("Interviews are disabled."))
    }

    fn moderation(&self) -> gatehouse_common::Result<&Moderation> {
        self.moderation
            .as_deref()
            .ok_or_else(|| gatehouse_common::Error::not_found("Moderation is disabled."))
    }

    async fn reply(&self, message: &InboundMessage, text: &str) {
        if let Err(e) = self.gateway.send_message(message.channel, text).await {
            warn!(channel_id = %message.channel, error = %e, "failed to send command reply");
        }
    }

    async fn on_member_joined(&self, user: UserId) {
        let Some(workflow) = &self.interviews else {
            return;
        };
        if user == self.gateway.bot_user_id() {
            return;
        }
        match workflow.on_applicant_joined(user).await {
            Ok(outcome) => {
                debug!(applicant_id = %user, channel_id = %outcome.record().channel, "join handled");
            },
            Err(e) => warn!(applicant_id = %user, error = %e, "failed to open interview"),
        }
    }

    async fn on_member_left(&self, user: UserId, username: &str) {
        let Some(workflow) = &self.interviews else {
            return;
        };
        // The archival ticket is dropped; the worker finishes regardless.
        if let Err(e) = workflow.on_applicant_left(user, username).await {
            warn!(applicant_id = %user, error = %e, "failed to archive interview after departure");
        }
    }
}

#[async_trait]
impl EventSink for Dispatcher {
    async fn dispatch(&self, event: InboundEvent) {
        debug!(kind = event.kind(), "inbound event");
        match event {
            InboundEvent::MemberJoined { user } => self.on_member_joined(user).await,
            InboundEvent::MemberLeft { user, username } => {
                self.on_member_left(user, &username).await;
            },
            InboundEvent::ReactionAdded {
                channel,
                message,
                user,
                emoji,
            } => {
                let Some(workflow) = &self.interviews else {
                    return;
                };
                if user == self.gateway.bot_user_id() {
                    return;
                }
                if let Err(e) = workflow
                    .on_question_advance(channel, message, user, &emoji)
                    .await
                {
                    warn!(channel_id = %channel, error = %e, "failed to advance interview");
                }
            },
            InboundEvent::Message(message) => self.on_message(&message).await,
        }
    }
}

fn format_mod_logs(target: UserId, page: &ModLogPage) -> String {
    if page.total_entries == 0 {
        return format!("No mod log entries for {}.", target.mention());
    }
    let mut out = format!(
        "Mod logs for {} (page {}/{}, {} entries)",
        target.mention(),
        page.page,
        page.total_pages,
        page.total_entries
    );
    for entry in &page.entries {
        let when = i64::try_from(entry.timestamp_ms)
            .ok()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "\n`#{}` {} **{}** by {}: {}",
            entry.id,
            when,
            entry.action,
            entry.moderator.mention(),
            entry.reason
        ));
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        gatehouse_channels::{GatewayCall, MemberInfo, RecordingGateway},
        gatehouse_common::{ChannelId, Clock, ManualClock, MessageId},
        gatehouse_interviews::{
            ArchivalPipeline, ArchiveConfig, WorkflowConfig,
            store::InterviewStore,
            store_memory::InMemoryInterviewStore,
        },
        gatehouse_sanctions::{
            moderation::ModerationConfig,
            service::{SchedulerConfig, TimedActionScheduler},
            store::SanctionStore,
            store_memory::InMemorySanctionStore,
        },
    };

    use super::*;

    const BOT: UserId = UserId::new(1);
    const MOD: UserId = UserId::new(2);
    const USER: UserId = UserId::new(3);
    const MOD_ROLE: RoleId = RoleId::new(20);
    const MUTE: RoleId = RoleId::new(900);

    struct Harness {
        gateway: Arc<RecordingGateway>,
        interview_store: Arc<InMemoryInterviewStore>,
        channel: ChannelId,
        interviews: Arc<InterviewWorkflow>,
        moderation: Arc<Moderation>,
    }

    fn member(id: UserId, position: i64, roles: &[RoleId]) -> MemberInfo {
        MemberInfo {
            user_id: id,
            username: format!("user{id}"),
            display_name: format!("User {id}"),
            avatar_url: None,
            roles: roles.iter().copied().collect(),
            top_role_position: position,
            managed_roles: BTreeSet::new(),
        }
    }

    fn harness() -> Harness {
        let gateway = Arc::new(RecordingGateway::new(BOT));
        gateway.add_member(member(BOT, 100, &[]));
        gateway.add_member(member(MOD, 50, &[MOD_ROLE]));
        gateway.add_member(member(USER, 10, &[]));
        let channel = gateway.add_channel();
        let welcome_channel = gateway.add_channel();
        let dyn_gateway = Arc::clone(&gateway) as Arc<dyn NotificationGateway>;

        let interview_store = Arc::new(InMemoryInterviewStore::new());
        let (queue, _handle) = ArchivalPipeline::new(
            Arc::clone(&dyn_gateway),
            Arc::clone(&interview_store) as Arc<dyn InterviewStore>,
            ArchiveConfig::default(),
        )
        .spawn();
        let interviews = Arc::new(InterviewWorkflow::new(
            Arc::clone(&interview_store) as Arc<dyn InterviewStore>,
            Arc::clone(&dyn_gateway),
            queue,
            WorkflowConfig {
                gatekeeper_role: RoleId::new(30),
                member_role: RoleId::new(31),
                mod_roles: vec![MOD_ROLE],
                helper_roles: vec![],
                everyone_can_see: false,
                hide_interview_role: None,
                category: None,
                welcome_channel,
                questions: vec!["Why are you here?".into()],
                welcome_message: "Welcome {mention}".into(),
                seed_emoji: "ok".into(),
                approval_message: "Welcome {mention}".into(),
                denial_message: "Sorry {mention}".into(),
                guild_name: "Guild".into(),
            },
        ));

        let sanction_store = Arc::new(InMemorySanctionStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000)) as Arc<dyn Clock>;
        let scheduler = TimedActionScheduler::new(
            Arc::clone(&sanction_store) as Arc<dyn SanctionStore>,
            Arc::clone(&dyn_gateway),
            Arc::clone(&clock),
            SchedulerConfig::default(),
        );
        let moderation = Arc::new(Moderation::new(
            scheduler,
            sanction_store as Arc<dyn SanctionStore>,
            dyn_gateway,
            clock,
            ModerationConfig {
                mute_role: MUTE,
                mod_log_channel: None,
            },
        ));

        Harness {
            gateway,
            interview_store,
            channel,
            interviews,
            moderation,
        }
    }

    fn dispatcher(h: &Harness) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&h.gateway) as Arc<dyn NotificationGateway>,
            DispatchConfig {
                prefixes: vec!["!".into()],
                mod_roles: BTreeSet::from([MOD_ROLE]),
            },
        )
        .with_interviews(Arc::clone(&h.interviews))
        .with_moderation(Arc::clone(&h.moderation))
    }

    fn message(h: &Harness, author: UserId, content: &str) -> InboundEvent {
        let author_roles = h.gateway.roles_of(author).unwrap_or_default();
        InboundEvent::Message(InboundMessage {
            channel: h.channel,
            message: MessageId::new(5),
            author,
            author_roles,
            content: content.into(),
        })
    }

    fn replies(h: &Harness) -> Vec<String> {
        h.gateway
            .calls_of("send_message")
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::SendMessage { channel, content } if channel == h.channel => {
                    Some(content)
                },
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn moderator_can_mute() {
        let h = harness();
        dispatcher(&h)
            .dispatch(message(&h, MOD, "!mute <@3> 1h spam"))
            .await;

        assert_eq!(replies(&h), ["Muted <@3> for 1 hour. Reason: spam"]);
        assert!(h.gateway.roles_of(USER).unwrap().contains(&MUTE));
    }

    #[tokio::test]
    async fn non_moderator_is_refused() {
        let h = harness();
        dispatcher(&h)
            .dispatch(message(&h, USER, "!warn <@2> no"))
            .await;

        assert_eq!(replies(&h), [
            "You can't do that: a moderator role is required."
        ]);
        assert!(h.gateway.calls_of("send_direct").is_empty());
    }

    #[tokio::test]
    async fn malformed_command_gets_usage() {
        let h = harness();
        dispatcher(&h).dispatch(message(&h, MOD, "!mute <@3>")).await;
        assert_eq!(replies(&h), ["Usage: mute <user> <duration> [reason]"]);
    }

    #[tokio::test]
    async fn approve_outside_interview_is_not_found() {
        let h = harness();
        dispatcher(&h)
            .dispatch(message(&h, MOD, "!interview approve"))
            .await;
        assert_eq!(replies(&h), ["This channel is not an interview."]);
    }

    #[tokio::test]
    async fn mod_logs_are_listed() {
        let h = harness();
        let d = dispatcher(&h);
        d.dispatch(message(&h, MOD, "!modlogs <@3>")).await;
        d.dispatch(message(&h, MOD, "!warn <@3> be nice")).await;
        d.dispatch(message(&h, MOD, "!modlogs <@3>")).await;

        let replies = replies(&h);
        assert_eq!(replies[0], "No mod log entries for <@3>.");
        assert_eq!(replies[1], "Warned <@3>. Reason: be nice");
        assert!(replies[2].starts_with("Mod logs for <@3> (page 1/1, 1 entries)"));
        assert!(replies[2].contains("**warn** by <@2>: be nice"));
    }

    #[tokio::test]
    async fn join_and_reaction_drive_the_interview() {
        let h = harness();
        let d = dispatcher(&h);
        d.dispatch(InboundEvent::MemberJoined { user: USER }).await;

        let record = h.interview_store.get_interview(USER).await.unwrap().unwrap();
        d.dispatch(InboundEvent::ReactionAdded {
            channel: record.channel,
            message: record.welcome_message,
            user: BOT,
            emoji: "ok".into(),
        })
        .await;
        d.dispatch(InboundEvent::ReactionAdded {
            channel: record.channel,
            message: record.welcome_message,
            user: USER,
            emoji: "ok".into(),
        })
        .await;

        let record = h.interview_store.get_interview(USER).await.unwrap().unwrap();
        assert_eq!(record.current_question, 1);
    }

    #[tokio::test]
    async fn unregistered_subsystems_are_ignored() {
        let h = harness();
        let d = Dispatcher::new(
            Arc::clone(&h.gateway) as Arc<dyn NotificationGateway>,
            DispatchConfig {
                prefixes: vec!["!".into()],
                mod_roles: BTreeSet::from([MOD_ROLE]),
            },
        )
        .with_moderation(Arc::clone(&h.moderation));

        d.dispatch(InboundEvent::MemberJoined { user: USER }).await;
        d.dispatch(message(&h, MOD, "!interview approve")).await;

        assert!(h.gateway.calls().is_empty());
        assert!(h.interview_store.list_interviews().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bot_messages_are_ignored() {
        let h = harness();
        dispatcher(&h)
            .dispatch(message(&h, BOT, "!mute <@3> 1h"))
            .await;
        assert!(h.gateway.calls().is_empty());
    }
}
