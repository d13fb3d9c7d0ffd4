//! Moderator commands built on the scheduler: mute, hardmute, unmute, warn
//! and mod log paging.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use {
    gatehouse_channels::{MemberInfo, NotificationGateway},
    gatehouse_common::{ChannelId, Clock, RoleId, UserId},
    tracing::{info, warn},
};

use crate::{
    Error, Result,
    parse::humanize,
    service::TimedActionScheduler,
    store::SanctionStore,
    types::{
        ModAction, ModLogEntry, NewModLogEntry, PendingAction, PendingActionCreate, SanctionKind,
    },
};

/// Entries per `modlogs` page.
pub const MOD_LOG_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub mute_role: RoleId,
    pub mod_log_channel: Option<ChannelId>,
}

/// One page of a member's moderation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModLogPage {
    pub entries: Vec<ModLogEntry>,
    /// 1-based.
    pub page: usize,
    pub total_pages: usize,
    pub total_entries: usize,
}

pub struct Moderation {
    scheduler: Arc<TimedActionScheduler>,
    store: Arc<dyn SanctionStore>,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    config: ModerationConfig,
}

impl Moderation {
    pub fn new(
        scheduler: Arc<TimedActionScheduler>,
        store: Arc<dyn SanctionStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        config: ModerationConfig,
    ) -> Self {
        Self {
            scheduler,
            store,
            gateway,
            clock,
            config,
        }
    }

    /// Add the mute role until `duration` has passed.
    pub async fn mute(
        &self,
        moderator: UserId,
        target: UserId,
        duration: Duration,
        reason: &str,
    ) -> Result<PendingAction> {
        let member = self.require_member(target).await?;
        self.check_outranks(moderator, &member).await?;
        self.check_not_muted(&member).await?;

        let action = self
            .scheduler
            .schedule_action(PendingActionCreate {
                applicant: target,
                kind: SanctionKind::Mute,
                roles_to_remove: BTreeSet::from([self.config.mute_role]),
                roles_to_add: BTreeSet::new(),
                expires_at_ms: self.expiry(duration),
            })
            .await?;

        let audit = format!("Mute: {reason}");
        if let Err(e) = self
            .gateway
            .grant_role(target, self.config.mute_role, &audit)
            .await
        {
            self.roll_back(&action).await;
            return Err(e.into());
        }

        self.record(target, moderator, ModAction::Mute, reason, Some(duration))
            .await?;
        Ok(action)
    }

    /// Strip every role, add the mute role, and restore the stripped roles
    /// when `duration` has passed.
    pub async fn hardmute(
        &self,
        moderator: UserId,
        target: UserId,
        duration: Duration,
        reason: &str,
    ) -> Result<PendingAction> {
        let member = self.require_member(target).await?;
        self.check_outranks(moderator, &member).await?;
        self.check_bot_outranks(&member).await?;
        self.check_not_muted(&member).await?;

        let snapshot: BTreeSet<RoleId> = member
            .roles
            .iter()
            .copied()
            .filter(|r| *r != self.config.mute_role && !member.managed_roles.contains(r))
            .collect();

        let action = self
            .scheduler
            .schedule_action(PendingActionCreate {
                applicant: target,
                kind: SanctionKind::Hardmute,
                roles_to_remove: BTreeSet::from([self.config.mute_role]),
                roles_to_add: snapshot.clone(),
                expires_at_ms: self.expiry(duration),
            })
            .await?;

        let audit = format!("Hardmute: {reason}");
        let applied = async {
            self.gateway
                .grant_role(target, self.config.mute_role, &audit)
                .await?;
            for role in &snapshot {
                self.gateway.revoke_role(target, *role, &audit).await?;
            }
            Ok::<_, gatehouse_channels::Error>(())
        }
        .await;
        if let Err(e) = applied {
            self.roll_back(&action).await;
            return Err(e.into());
        }

        self.record(target, moderator, ModAction::Hardmute, reason, Some(duration))
            .await?;
        Ok(action)
    }

    /// Lift a mute or hardmute now.
    ///
    /// Without a pending action, a held mute role is still removed.
    pub async fn unmute(&self, moderator: UserId, target: UserId, reason: &str) -> Result<()> {
        let member = self.require_member(target).await?;
        self.check_outranks(moderator, &member).await?;

        match self.store.action_for(target).await? {
            Some(action) => {
                self.scheduler.cancel_action(&action.id).await?;
            },
            None if member.roles.contains(&self.config.mute_role) => {
                self.gateway
                    .revoke_role(target, self.config.mute_role, &format!("Unmute: {reason}"))
                    .await?;
            },
            None => return Err(Error::NotMuted { applicant: target }),
        }

        self.record(target, moderator, ModAction::Unmute, reason, None)
            .await?;
        Ok(())
    }

    /// Log a warning and tell the member about it.
    pub async fn warn(&self, moderator: UserId, target: UserId, reason: &str) -> Result<()> {
        self.require_member(target).await?;
        self.record(target, moderator, ModAction::Warn, reason, None)
            .await?;
        Ok(())
    }

    /// A member's moderation history, newest first, [`MOD_LOG_PAGE_SIZE`]
    /// entries per page. `page` is 1-based; 0 is treated as 1.
    pub async fn mod_logs(&self, target: UserId, page: usize) -> Result<ModLogPage> {
        let all = self.store.mod_logs(target).await?;
        let page = page.max(1);
        let total_entries = all.len();
        let total_pages = total_entries.div_ceil(MOD_LOG_PAGE_SIZE);
        if total_entries > 0 && page > total_pages {
            return Err(Error::PageOutOfRange { page });
        }
        let entries = all
            .into_iter()
            .skip((page - 1) * MOD_LOG_PAGE_SIZE)
            .take(MOD_LOG_PAGE_SIZE)
            .collect();
        Ok(ModLogPage {
            entries,
            page,
            total_pages,
            total_entries,
        })
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn expiry(&self, duration: Duration) -> u64 {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.clock.now_ms().saturating_add(ms)
    }

    async fn require_member(&self, user: UserId) -> Result<MemberInfo> {
        self.gateway
            .member(user)
            .await?
            .ok_or(Error::NotAMember { applicant: user })
    }

    async fn check_outranks(&self, moderator: UserId, target: &MemberInfo) -> Result<()> {
        let moderator = self.require_member(moderator).await?;
        if moderator.top_role_position <= target.top_role_position {
            return Err(Error::hierarchy(format!(
                "your highest role must be above {}'s",
                target.display_name
            )));
        }
        Ok(())
    }

    async fn check_bot_outranks(&self, target: &MemberInfo) -> Result<()> {
        let bot = self.require_member(self.gateway.bot_user_id()).await?;
        if bot.top_role_position <= target.top_role_position {
            return Err(Error::hierarchy(format!(
                "the bot's highest role must be above {}'s",
                target.display_name
            )));
        }
        Ok(())
    }

    async fn check_not_muted(&self, member: &MemberInfo) -> Result<()> {
        if member.roles.contains(&self.config.mute_role)
            || self.store.action_for(member.user_id).await?.is_some()
        {
            return Err(Error::AlreadyActive {
                applicant: member.user_id,
            });
        }
        Ok(())
    }

    /// Undo a partially applied sanction so the moderator can retry.
    async fn roll_back(&self, action: &PendingAction) {
        if let Err(e) = self.scheduler.cancel_action(&action.id).await {
            warn!(
                action_id = %action.id,
                error = %e,
                "rollback failed; the scheduled reversion will restore roles"
            );
        }
    }

    /// Append to the mod log, then DM the member and announce in the mod
    /// log channel. Only the log write can fail the command.
    async fn record(
        &self,
        target: UserId,
        moderator: UserId,
        action: ModAction,
        reason: &str,
        duration: Option<Duration>,
    ) -> Result<()> {
        self.store
            .add_mod_log(&NewModLogEntry {
                applicant: target,
                moderator,
                action,
                reason: reason.into(),
                timestamp_ms: self.clock.now_ms(),
            })
            .await?;
        info!(applicant_id = %target, moderator_id = %moderator, %action, "moderation action recorded");

        let length = duration.map(|d| format!(" for {}", humanize(d))).unwrap_or_default();
        let verb = match action {
            ModAction::Warn => "warned",
            ModAction::Mute => "muted",
            ModAction::Hardmute => "hardmuted",
            ModAction::Unmute => "unmuted",
        };

        let direct = format!("You were {verb}{length}. Reason: {reason}");
        if let Err(e) = self.gateway.send_direct(target, &direct).await {
            warn!(applicant_id = %target, error = %e, "could not DM member");
        }

        if let Some(channel) = self.config.mod_log_channel {
            let text = format!(
                "{} was {verb}{length} by {}. Reason: {reason}",
                target.mention(),
                moderator.mention()
            );
            if let Err(e) = self.gateway.send_message(channel, &text).await {
                warn!(error = %e, "failed to post to mod log channel");
            }
        }
        Ok(())
    }
}
