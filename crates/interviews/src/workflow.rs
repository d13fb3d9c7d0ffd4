//! Per-applicant interview state machine.
//!
//! Join (or the manual create command) opens a channel, reactions on the
//! welcome message walk the applicant through the questions, and a decision
//! or departure hands the channel to the [`ArchivalQueue`]. Operations on
//! one applicant are serialized by a per-applicant async lock so a join and
//! a manual create cannot both open a channel.

use std::sync::Arc;

use {
    dashmap::DashMap,
    gatehouse_channels::{
        Access, ChannelSpec, MemberInfo, NotificationGateway, Overwrite, OverwriteTarget,
    },
    gatehouse_common::{ChannelId, MessageId, RoleId, UserId},
    tokio::sync::{Mutex, OwnedMutexGuard},
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    archive::{ArchivalQueue, ArchivalTicket},
    store::InterviewStore,
    types::{
        AdvanceOutcome, ArchivalTask, Decision, InterviewRecord, JoinOutcome, render_template,
    },
};

const MAX_CHANNEL_NAME: usize = 100;

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub gatekeeper_role: RoleId,
    pub member_role: RoleId,
    pub mod_roles: Vec<RoleId>,
    pub helper_roles: Vec<RoleId>,
    /// Regular members may read (not write) interview channels.
    pub everyone_can_see: bool,
    /// Denied view when `everyone_can_see` is set.
    pub hide_interview_role: Option<RoleId>,
    pub category: Option<ChannelId>,
    /// Where approvals are announced.
    pub welcome_channel: ChannelId,
    pub questions: Vec<String>,
    pub welcome_message: String,
    pub seed_emoji: String,
    pub approval_message: String,
    pub denial_message: String,
    pub guild_name: String,
}

/// Held while operating on one applicant. Dropping it releases the lock
/// and forgets the applicant's mutex once nobody else holds or awaits it.
struct ApplicantLock<'a> {
    locks: &'a DashMap<UserId, Arc<Mutex<()>>>,
    applicant: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ApplicantLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.applicant, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct InterviewWorkflow {
    store: Arc<dyn InterviewStore>,
    gateway: Arc<dyn NotificationGateway>,
    archive: ArchivalQueue,
    config: WorkflowConfig,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl InterviewWorkflow {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        gateway: Arc<dyn NotificationGateway>,
        archive: ArchivalQueue,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            archive,
            config,
            locks: DashMap::new(),
        }
    }

    async fn lock_applicant(&self, applicant: UserId) -> ApplicantLock<'_> {
        let lock = Arc::clone(self.locks.entry(applicant).or_default().value());
        ApplicantLock {
            locks: &self.locks,
            applicant,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Grant the gatekeeper role and open an interview channel unless one
    /// is already open. Also backs the manual `interview create` command.
    pub async fn on_applicant_joined(&self, applicant: UserId) -> Result<JoinOutcome> {
        let _lock = self.lock_applicant(applicant).await;

        self.gateway
            .grant_role(
                applicant,
                self.config.gatekeeper_role,
                "Interview: add gatekeeper role",
            )
            .await?;

        if let Some(existing) = self.store.get_interview(applicant).await? {
            if !self.archive.is_queued(existing.channel) {
                debug!(applicant_id = %applicant, channel_id = %existing.channel, "interview already open");
                return Ok(JoinOutcome::Existing(existing));
            }
            // The old channel is being archived; its task carries everything
            // the worker still needs, so the record can go now.
            self.store.delete_interview(existing.channel).await?;
            info!(applicant_id = %applicant, channel_id = %existing.channel, "rejoined during archival, opening a new interview");
        }

        let member = self
            .gateway
            .member(applicant)
            .await?
            .ok_or(Error::NotAMember { user: applicant })?;
        let channel = self.gateway.create_channel(&self.channel_spec(&member)).await?;

        match self.open_channel(applicant, channel).await {
            Ok(record) => {
                info!(applicant_id = %applicant, channel_id = %channel, "interview opened");
                Ok(JoinOutcome::Created(record))
            },
            Err(e) => {
                warn!(applicant_id = %applicant, channel_id = %channel, error = %e, "interview setup failed, removing channel");
                if let Err(cleanup) = self
                    .gateway
                    .delete_channel(channel, "Interview setup failed")
                    .await
                {
                    warn!(channel_id = %channel, error = %cleanup, "could not remove half-created channel");
                }
                Err(e)
            },
        }
    }

    async fn open_channel(&self, applicant: UserId, channel: ChannelId) -> Result<InterviewRecord> {
        let welcome = render_template(
            &self.config.welcome_message,
            applicant,
            &self.config.guild_name,
        );
        let welcome_message = self.gateway.send_message(channel, &welcome).await?;
        self.gateway
            .add_reaction(channel, welcome_message, &self.config.seed_emoji)
            .await?;

        let record = InterviewRecord {
            applicant,
            channel,
            welcome_message,
            current_question: 0,
        };
        self.store.create_interview(&record).await?;
        Ok(record)
    }

    fn channel_spec(&self, member: &MemberInfo) -> ChannelSpec {
        let full = vec![Access::View, Access::Send, Access::React, Access::ReadHistory];
        let mut overwrites = vec![
            Overwrite {
                target: OverwriteTarget::Member(member.user_id),
                allow: full.clone(),
                deny: vec![],
            },
            Overwrite {
                target: OverwriteTarget::Member(self.gateway.bot_user_id()),
                allow: [full.as_slice(), &[Access::ManageMessages]].concat(),
                deny: vec![],
            },
        ];
        overwrites.extend(self.config.mod_roles.iter().map(|&role| Overwrite {
            target: OverwriteTarget::Role(role),
            allow: vec![Access::View, Access::Send, Access::React],
            deny: vec![],
        }));
        overwrites.extend(self.config.helper_roles.iter().map(|&role| Overwrite {
            target: OverwriteTarget::Role(role),
            allow: vec![Access::View],
            deny: vec![Access::ManageMessages],
        }));

        if self.config.everyone_can_see {
            overwrites.push(Overwrite {
                target: OverwriteTarget::Everyone,
                allow: vec![],
                deny: vec![Access::Send, Access::React],
            });
            if let Some(hidden) = self.config.hide_interview_role {
                overwrites.push(Overwrite {
                    target: OverwriteTarget::Role(hidden),
                    allow: vec![],
                    deny: vec![Access::View],
                });
            }
        } else {
            overwrites.push(Overwrite {
                target: OverwriteTarget::Everyone,
                allow: vec![],
                deny: vec![Access::View],
            });
        }

        ChannelSpec {
            name: channel_name(&member.username),
            category: self.config.category,
            overwrites,
            reason: format!("Interview channel for {}", member.user_id),
        }
    }

    /// Send the next question when the applicant reacts to their welcome
    /// message. Reactions from anyone else, or on any other message, are
    /// ignored.
    pub async fn on_question_advance(
        &self,
        channel: ChannelId,
        message: MessageId,
        user: UserId,
        emoji: &str,
    ) -> Result<AdvanceOutcome> {
        let Some(record) = self.store.get_interview_by_channel(channel).await? else {
            return Ok(AdvanceOutcome::Ignored);
        };
        if record.applicant != user || record.welcome_message != message {
            return Ok(AdvanceOutcome::Ignored);
        }

        let _lock = self.lock_applicant(user).await;

        // Reload under the lock; a decision may have landed meanwhile.
        let Some(record) = self.store.get_interview(user).await? else {
            return Ok(AdvanceOutcome::Ignored);
        };
        if record.channel != channel || self.archive.is_queued(channel) {
            return Ok(AdvanceOutcome::Ignored);
        }
        if self.gateway.member(user).await?.is_none() {
            return Ok(AdvanceOutcome::Ignored);
        }

        let index = record.current_question;
        let Some(question) = self.config.questions.get(index) else {
            debug!(applicant_id = %user, "all questions already sent");
            return Ok(AdvanceOutcome::Exhausted);
        };

        self.gateway.send_message(channel, question).await?;
        self.store.set_question(channel, index + 1).await?;

        if let Err(e) = self
            .gateway
            .remove_reaction(channel, message, user, emoji)
            .await
        {
            warn!(channel_id = %channel, error = %e, "could not clear advance reaction");
        }
        debug!(applicant_id = %user, index, "question sent");
        Ok(AdvanceOutcome::Advanced { index })
    }

    /// Archive the interview of an applicant who left before a decision.
    /// Returns `None` when there was nothing to archive.
    pub async fn on_applicant_left(
        &self,
        applicant: UserId,
        username: &str,
    ) -> Result<Option<ArchivalTicket>> {
        let _lock = self.lock_applicant(applicant).await;

        let Some(record) = self.store.get_interview(applicant).await? else {
            return Ok(None);
        };
        // A denied applicant leaves because archival removed them.
        if self.archive.is_queued(record.channel) {
            return Ok(None);
        }

        let notice = format!("{username} left before finishing their interview.");
        if let Err(e) = self.gateway.send_message(record.channel, &notice).await {
            warn!(channel_id = %record.channel, error = %e, "could not announce departure");
        }
        info!(applicant_id = %applicant, channel_id = %record.channel, "applicant left, archiving");

        let ticket = self.archive.enqueue(ArchivalTask {
            channel: record.channel,
            applicant: Some(applicant),
            remove_applicant: false,
            decision: Decision::Left,
        })?;
        Ok(Some(ticket))
    }

    /// Resolve the interview in `channel` or fail with the reasons a
    /// decision cannot be made there.
    async fn decidable(&self, channel: ChannelId) -> Result<InterviewRecord> {
        if self.archive.is_queued(channel) {
            return Err(Error::AlreadyArchiving { channel });
        }
        self.store
            .get_interview_by_channel(channel)
            .await?
            .ok_or(Error::NotAnInterview { channel })
    }

    /// Admit the applicant, announce it publicly and archive the channel.
    pub async fn approve(&self, channel: ChannelId, moderator: UserId) -> Result<ArchivalTicket> {
        let applicant = self.decidable(channel).await?.applicant;
        let _lock = self.lock_applicant(applicant).await;
        let record = self.decidable(channel).await?;

        let reason = format!("Interview approved by {moderator}");
        self.gateway
            .grant_role(record.applicant, self.config.member_role, &reason)
            .await?;
        self.gateway
            .revoke_role(record.applicant, self.config.gatekeeper_role, &reason)
            .await?;

        let announcement = render_template(
            &self.config.approval_message,
            record.applicant,
            &self.config.guild_name,
        );
        if let Err(e) = self
            .gateway
            .send_message(self.config.welcome_channel, &announcement)
            .await
        {
            warn!(channel_id = %self.config.welcome_channel, error = %e, "could not announce approval");
        }
        info!(applicant_id = %record.applicant, moderator_id = %moderator, "interview approved");

        self.archive.enqueue(ArchivalTask {
            channel,
            applicant: Some(record.applicant),
            remove_applicant: false,
            decision: Decision::Approved,
        })
    }

    /// Tell the applicant they were not admitted and archive the channel,
    /// removing them during the countdown.
    pub async fn deny(&self, channel: ChannelId, moderator: UserId) -> Result<ArchivalTicket> {
        let applicant = self.decidable(channel).await?.applicant;
        let _lock = self.lock_applicant(applicant).await;
        let record = self.decidable(channel).await?;

        let notice = render_template(
            &self.config.denial_message,
            record.applicant,
            &self.config.guild_name,
        );
        self.gateway.send_message(channel, &notice).await?;
        info!(applicant_id = %record.applicant, moderator_id = %moderator, "interview denied");

        self.archive.enqueue(ArchivalTask {
            channel,
            applicant: Some(record.applicant),
            remove_applicant: true,
            decision: Decision::Denied,
        })
    }

    /// Archive `channel` whether or not it holds a tracked interview.
    pub async fn manual_archive(
        &self,
        channel: ChannelId,
        moderator: UserId,
    ) -> Result<ArchivalTicket> {
        if self.archive.is_queued(channel) {
            return Err(Error::AlreadyArchiving { channel });
        }
        let applicant = self
            .store
            .get_interview_by_channel(channel)
            .await?
            .map(|r| r.applicant);
        info!(channel_id = %channel, moderator_id = %moderator, tracked = applicant.is_some(), "manual archive");

        self.archive.enqueue(ArchivalTask {
            channel,
            applicant,
            remove_applicant: false,
            decision: Decision::Manual,
        })
    }
}

/// `{username}-interview`, restricted to characters channel names allow.
fn channel_name(username: &str) -> String {
    let mut base: String = username
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = base.trim_matches('-');
    base = if trimmed.is_empty() {
        "applicant".into()
    } else {
        trimmed.into()
    };
    let name = format!("{base}-interview");
    name.chars().take(MAX_CHANNEL_NAME).collect()
}
