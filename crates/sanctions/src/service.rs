//! Timed action scheduler: min-heap timer, backstop sweep, revert logic.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use {
    gatehouse_channels::NotificationGateway,
    gatehouse_common::{ChannelId, Clock, RoleId},
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    store::SanctionStore,
    types::{
        ModAction, NewModLogEntry, PendingAction, PendingActionCreate, SweepOutcome, SweepReport,
    },
};

/// Reason written to the mod log for automatic reversions.
pub const AUTOMATIC_UNMUTE_REASON: &str = "Automatic unmute";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Backstop sweep interval.
    pub poll_interval: Duration,
    /// Where automatic unmutes are announced.
    pub mod_log_channel: Option<ChannelId>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            mod_log_channel: None,
        }
    }
}

/// What happened to one expired action during a sweep.
enum Disposition {
    Reverted,
    Abandoned,
    Deferred,
}

/// Guarantees every [`PendingAction`] is reverted exactly once.
pub struct TimedActionScheduler {
    store: Arc<dyn SanctionStore>,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    /// Expiry timers, earliest first. Entries for cancelled actions stay
    /// until popped; the sweep ignores them.
    timers: StdMutex<BinaryHeap<Reverse<(u64, String)>>>,
    sweep_lock: Mutex<()>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl TimedActionScheduler {
    pub fn new(
        store: Arc<dyn SanctionStore>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            gateway,
            clock,
            config,
            timers: StdMutex::new(BinaryHeap::new()),
            sweep_lock: Mutex::new(()),
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    /// Load persisted actions into the timer heap and start the timer loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let loaded = self.store.list_actions().await?;
        info!(count = loaded.len(), "loaded pending actions");
        {
            let mut timers = self.timers();
            for action in loaded {
                timers.push(Reverse((action.expires_at_ms, action.id)));
            }
        }

        *self.running.write().await = true;

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop().await;
        });
        *self.timer_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the timer loop. A sweep already in progress is aborted between
    /// gateway calls; the actions it did not finish stay persisted.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.timer_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        info!("timed action scheduler stopped");
    }

    /// Persist a new pending action and arm its timer.
    ///
    /// Rejects a second active mute/hardmute for the same applicant.
    pub async fn schedule_action(&self, create: PendingActionCreate) -> Result<PendingAction> {
        if self.store.action_for(create.applicant).await?.is_some() {
            return Err(Error::AlreadyActive {
                applicant: create.applicant,
            });
        }

        let action = PendingAction {
            id: uuid::Uuid::new_v4().to_string(),
            applicant: create.applicant,
            kind: create.kind,
            roles_to_remove: create.roles_to_remove,
            roles_to_add: create.roles_to_add,
            expires_at_ms: create.expires_at_ms,
        };
        self.store.save_action(&action).await?;

        self.timers()
            .push(Reverse((action.expires_at_ms, action.id.clone())));
        self.wake_notify.notify_one();

        info!(
            action_id = %action.id,
            applicant_id = %action.applicant,
            kind = %action.kind,
            expires_at_ms = action.expires_at_ms,
            "pending action scheduled"
        );
        Ok(action)
    }

    /// Revert an action now and delete it.
    ///
    /// Gateway failures are returned to the caller and leave the action in
    /// place, so the scheduled reversion still happens later. Waits for a
    /// running sweep, so an action is never reverted by both.
    pub async fn cancel_action(&self, action_id: &str) -> Result<PendingAction> {
        let _sweep = self.sweep_lock.lock().await;
        let action = self
            .store
            .list_actions()
            .await?
            .into_iter()
            .find(|a| a.id == action_id)
            .ok_or_else(|| Error::action_not_found(action_id))?;

        if let Some((_, e)) = self.revert(&action).await.into_iter().next() {
            return Err(e.into());
        }
        self.store.delete_action(&action.id).await?;
        info!(action_id = %action.id, applicant_id = %action.applicant, "pending action cancelled");
        Ok(action)
    }

    /// Every persisted action, earliest expiry first.
    pub async fn pending(&self) -> Result<Vec<PendingAction>> {
        self.store.list_actions().await
    }

    /// Actions still pending more than two poll intervals past their expiry.
    ///
    /// Non-empty means the scheduler is not keeping up.
    pub async fn overdue(&self) -> Result<Vec<PendingAction>> {
        let grace = u64::try_from(self.config.poll_interval.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(2);
        let now = self.clock.now_ms();
        Ok(self
            .store
            .list_actions()
            .await?
            .into_iter()
            .filter(|a| now.saturating_sub(a.expires_at_ms) > grace)
            .collect())
    }

    /// Revert every expired action.
    ///
    /// Returns [`SweepOutcome::Skipped`] without touching anything when
    /// another sweep is still running.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("sweep already in progress, skipping");
            return Ok(SweepOutcome::Skipped);
        };

        let now = self.clock.now_ms();
        let expired: Vec<PendingAction> = self
            .store
            .list_actions()
            .await?
            .into_iter()
            .filter(|a| a.expires_at_ms <= now)
            .collect();

        let mut report = SweepReport::default();
        for action in expired {
            let id = action.id.clone();
            match self.process_expired(action).await {
                Ok(Disposition::Reverted) => report.reverted.push(id),
                Ok(Disposition::Abandoned) => report.abandoned.push(id),
                Ok(Disposition::Deferred) => report.deferred.push(id),
                Err(e) => {
                    warn!(action_id = %id, error = %e, "failed to process expired action");
                    report.deferred.push(id);
                },
            }
        }

        if !report.reverted.is_empty() || !report.abandoned.is_empty() {
            info!(
                reverted = report.reverted.len(),
                abandoned = report.abandoned.len(),
                deferred = report.deferred.len(),
                "sweep finished"
            );
        }
        Ok(SweepOutcome::Completed(report))
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn timers(&self) -> std::sync::MutexGuard<'_, BinaryHeap<Reverse<(u64, String)>>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_wake();
            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.pop_due_timers();
            match self.sweep().await {
                Ok(_) => {},
                Err(e) => warn!(error = %e, "sweep failed"),
            }
            match self.overdue().await {
                Ok(stale) if !stale.is_empty() => {
                    warn!(count = stale.len(), "pending actions overdue by more than two sweep intervals");
                },
                Ok(_) => {},
                Err(e) => debug!(error = %e, "overdue check failed"),
            }
        }
    }

    fn ms_until_next_wake(&self) -> u64 {
        let poll_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX);
        let now = self.clock.now_ms();
        self.timers()
            .peek()
            .map_or(poll_ms, |Reverse((at, _))| at.saturating_sub(now).min(poll_ms))
    }

    fn pop_due_timers(&self) {
        let now = self.clock.now_ms();
        let mut timers = self.timers();
        while timers.peek().is_some_and(|Reverse((at, _))| *at <= now) {
            timers.pop();
        }
    }

    async fn process_expired(&self, action: PendingAction) -> Result<Disposition> {
        let present = match self.gateway.member(action.applicant).await {
            Ok(member) => member.is_some(),
            Err(e) if e.is_gone() => false,
            Err(e) if e.is_transient() => {
                warn!(action_id = %action.id, error = %e, "member lookup failed, deferring");
                return Ok(Disposition::Deferred);
            },
            Err(e) => {
                debug!(action_id = %action.id, error = %e, "member lookup refused, reverting anyway");
                true
            },
        };
        if !present {
            return self.abandon(&action).await;
        }

        let mut failed = self.revert(&action).await;
        if failed.iter().any(|(_, e)| e.is_transient()) {
            debug!(action_id = %action.id, "revert failed, retrying once");
            failed = self.revert(&action).await;
        }
        if failed.iter().any(|(_, e)| e.is_transient()) {
            warn!(action_id = %action.id, "revert still failing, leaving for next sweep");
            return Ok(Disposition::Deferred);
        }
        if failed.iter().any(|(_, e)| e.is_gone()) {
            return self.abandon(&action).await;
        }

        // Anything left was refused outright; retrying would never succeed.
        for (role, e) in &failed {
            warn!(
                action_id = %action.id,
                applicant_id = %action.applicant,
                role_id = %role,
                error = %e,
                "role change refused, ending action without it"
            );
        }
        let reason = if failed.is_empty() {
            AUTOMATIC_UNMUTE_REASON.to_string()
        } else {
            let roles: Vec<String> = failed.iter().map(|(role, _)| role.to_string()).collect();
            format!("{AUTOMATIC_UNMUTE_REASON} (incomplete, refused roles: {})", roles.join(", "))
        };

        self.store
            .add_mod_log(&NewModLogEntry {
                applicant: action.applicant,
                moderator: self.gateway.bot_user_id(),
                action: ModAction::Unmute,
                reason,
                timestamp_ms: self.clock.now_ms(),
            })
            .await?;
        self.store.delete_action(&action.id).await?;

        let text = if failed.is_empty() {
            info!(action_id = %action.id, applicant_id = %action.applicant, "pending action reverted");
            format!(
                "{} was automatically unmuted ({} expired).",
                action.applicant.mention(),
                action.kind
            )
        } else {
            format!(
                "{} could not be fully unmuted ({} expired); some roles must be fixed by hand.",
                action.applicant.mention(),
                action.kind
            )
        };
        if let Some(channel) = self.config.mod_log_channel
            && let Err(e) = self.gateway.send_message(channel, &text).await
        {
            warn!(error = %e, "failed to announce automatic unmute");
        }

        if failed.is_empty() {
            Ok(Disposition::Reverted)
        } else {
            Ok(Disposition::Abandoned)
        }
    }

    async fn abandon(&self, action: &PendingAction) -> Result<Disposition> {
        warn!(
            action_id = %action.id,
            applicant_id = %action.applicant,
            kind = %action.kind,
            "member no longer in guild, abandoning pending action"
        );
        self.store.delete_action(&action.id).await?;
        Ok(Disposition::Abandoned)
    }

    /// Remove `roles_to_remove`, then add `roles_to_add`. Every role is
    /// attempted; the ones the gateway refused come back with their errors.
    /// Both calls are idempotent, so repeating a partial revert is safe.
    async fn revert(&self, action: &PendingAction) -> Vec<(RoleId, gatehouse_channels::Error)> {
        let reason = format!("{} expired or lifted", action.kind);
        let mut failed = Vec::new();
        for role in &action.roles_to_remove {
            if let Err(e) = self.gateway.revoke_role(action.applicant, *role, &reason).await {
                failed.push((*role, e));
            }
        }
        for role in &action.roles_to_add {
            if let Err(e) = self.gateway.grant_role(action.applicant, *role, &reason).await {
                failed.push((*role, e));
            }
        }
        failed
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use {
        gatehouse_channels::{FailureKind, MemberInfo, RecordingGateway},
        gatehouse_common::{ManualClock, RoleId, UserId},
    };

    use {
        super::*,
        crate::{store_memory::InMemorySanctionStore, types::SanctionKind},
    };

    const BOT: UserId = UserId::new(1);
    const USER: UserId = UserId::new(42);
    const MUTE: RoleId = RoleId::new(900);
    const HOUR_MS: u64 = 3_600_000;

    struct Harness {
        store: Arc<InMemorySanctionStore>,
        gateway: Arc<RecordingGateway>,
        clock: Arc<ManualClock>,
        scheduler: Arc<TimedActionScheduler>,
    }

    fn member(id: UserId, roles: &[RoleId]) -> MemberInfo {
        MemberInfo {
            user_id: id,
            username: format!("user{id}"),
            display_name: format!("User {id}"),
            avatar_url: None,
            roles: roles.iter().copied().collect(),
            top_role_position: 1,
            managed_roles: BTreeSet::new(),
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemorySanctionStore::new());
        let gateway = Arc::new(RecordingGateway::new(BOT));
        let clock = Arc::new(ManualClock::new(1_000_000));
        let scheduler = TimedActionScheduler::new(
            Arc::clone(&store) as Arc<dyn SanctionStore>,
            Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            SchedulerConfig::default(),
        );
        Harness {
            store,
            gateway,
            clock,
            scheduler,
        }
    }

    fn mute_for(h: &Harness, ms: u64) -> PendingActionCreate {
        PendingActionCreate {
            applicant: USER,
            kind: SanctionKind::Mute,
            roles_to_remove: BTreeSet::from([MUTE]),
            roles_to_add: BTreeSet::new(),
            expires_at_ms: h.clock.now_ms() + ms,
        }
    }

    fn completed(outcome: SweepOutcome) -> SweepReport {
        match outcome {
            SweepOutcome::Completed(report) => report,
            SweepOutcome::Skipped => panic!("sweep was skipped"),
        }
    }

    #[tokio::test]
    async fn second_active_action_rejected() {
        let h = harness();
        h.scheduler.schedule_action(mute_for(&h, HOUR_MS)).await.unwrap();
        let err = h
            .scheduler
            .schedule_action(mute_for(&h, 2 * HOUR_MS))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyActive { applicant } if applicant == USER));
        assert_eq!(h.store.list_actions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_ignores_unexpired_actions() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        h.scheduler.schedule_action(mute_for(&h, HOUR_MS)).await.unwrap();

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report, SweepReport::default());
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn expired_mute_is_reverted_once_and_logged_as_system() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, HOUR_MS)).await.unwrap();

        h.clock.advance(Duration::from_millis(HOUR_MS + 1));
        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.reverted, vec![action.id.clone()]);
        assert!(!h.gateway.roles_of(USER).unwrap().contains(&MUTE));
        assert!(h.store.list_actions().await.unwrap().is_empty());

        let logs = h.store.mod_logs(USER).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].moderator, BOT);
        assert_eq!(logs[0].action, ModAction::Unmute);
        assert_eq!(logs[0].reason, AUTOMATIC_UNMUTE_REASON);

        h.gateway.clear_calls();
        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report, SweepReport::default());
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn hardmute_restores_snapshot() {
        let h = harness();
        let snapshot = BTreeSet::from([RoleId::new(5), RoleId::new(6)]);
        h.gateway.add_member(member(USER, &[MUTE]));
        h.scheduler
            .schedule_action(PendingActionCreate {
                applicant: USER,
                kind: SanctionKind::Hardmute,
                roles_to_remove: BTreeSet::from([MUTE]),
                roles_to_add: snapshot.clone(),
                expires_at_ms: h.clock.now_ms(),
            })
            .await
            .unwrap();

        completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(h.gateway.roles_of(USER).unwrap(), snapshot);
    }

    #[tokio::test]
    async fn missing_member_is_abandoned_without_role_calls() {
        let h = harness();
        let action = h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.abandoned, vec![action.id]);
        assert!(h.gateway.calls_of("revoke_role").is_empty());
        assert!(h.store.list_actions().await.unwrap().is_empty());
        assert!(h.store.mod_logs(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn member_vanishing_mid_revert_is_abandoned() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();
        h.gateway.fail_next("revoke_role", FailureKind::Gone);

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.abandoned, vec![action.id]);
        assert!(h.store.list_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();
        h.gateway.fail_next("revoke_role", FailureKind::Transient);

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.reverted, vec![action.id]);
        assert_eq!(h.gateway.calls_of("revoke_role").len(), 2);
    }

    #[tokio::test]
    async fn repeated_transient_failure_defers_to_next_sweep() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();
        h.gateway.fail_next("revoke_role", FailureKind::Transient);
        h.gateway.fail_next("revoke_role", FailureKind::Transient);

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.deferred, vec![action.id.clone()]);
        assert_eq!(h.store.list_actions().await.unwrap().len(), 1);

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.reverted, vec![action.id]);
    }

    #[tokio::test]
    async fn refused_revert_ends_the_action() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();
        h.gateway.fail_next("revoke_role", FailureKind::Rejected);

        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report.abandoned, vec![action.id]);
        assert_eq!(h.gateway.calls_of("revoke_role").len(), 1);
        assert!(h.store.list_actions().await.unwrap().is_empty());

        let logs = h.store.mod_logs(USER).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, ModAction::Unmute);
        assert!(logs[0].reason.contains("incomplete"));
        assert!(logs[0].reason.contains("900"));

        h.clock.advance(Duration::from_secs(3600));
        assert!(h.scheduler.overdue().await.unwrap().is_empty());
        let report = completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn refused_role_does_not_block_the_rest_of_a_hardmute() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        h.scheduler
            .schedule_action(PendingActionCreate {
                applicant: USER,
                kind: SanctionKind::Hardmute,
                roles_to_remove: BTreeSet::from([MUTE]),
                roles_to_add: BTreeSet::from([RoleId::new(5), RoleId::new(6)]),
                expires_at_ms: h.clock.now_ms(),
            })
            .await
            .unwrap();
        h.gateway.fail_next("grant_role", FailureKind::Rejected);

        completed(h.scheduler.sweep().await.unwrap());
        assert_eq!(h.gateway.roles_of(USER).unwrap(), BTreeSet::from([RoleId::new(6)]));
        assert!(h.store.list_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_waits_for_a_running_sweep() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();

        let guard = h.scheduler.sweep_lock.lock().await;
        let scheduler = Arc::clone(&h.scheduler);
        let id = action.id.clone();
        let cancel = tokio::spawn(async move { scheduler.cancel_action(&id).await });
        tokio::task::yield_now().await;
        assert!(h.gateway.calls_of("revoke_role").is_empty());

        // What the sweep does while it holds the lock.
        assert!(matches!(
            h.scheduler.process_expired(action).await.unwrap(),
            Disposition::Reverted
        ));
        drop(guard);

        let err = cancel.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ActionNotFound { .. }));
        assert_eq!(h.gateway.calls_of("revoke_role").len(), 1);
        assert_eq!(h.store.mod_logs(USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_sweep_is_skipped() {
        let h = harness();
        let _guard = h.scheduler.sweep_lock.lock().await;
        assert_eq!(h.scheduler.sweep().await.unwrap(), SweepOutcome::Skipped);
    }

    #[tokio::test]
    async fn cancel_reverts_immediately() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        let action = h.scheduler.schedule_action(mute_for(&h, HOUR_MS)).await.unwrap();

        h.scheduler.cancel_action(&action.id).await.unwrap();
        assert!(h.gateway.roles_of(USER).unwrap().is_empty());
        assert!(h.store.list_actions().await.unwrap().is_empty());

        let err = h.scheduler.cancel_action(&action.id).await.unwrap_err();
        assert!(matches!(err, Error::ActionNotFound { .. }));
    }

    #[tokio::test]
    async fn announces_automatic_unmute() {
        let store = Arc::new(InMemorySanctionStore::new());
        let gateway = Arc::new(RecordingGateway::new(BOT));
        let clock = Arc::new(ManualClock::new(0));
        let log_channel = gateway.add_channel();
        let scheduler = TimedActionScheduler::new(
            store,
            Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
            clock,
            SchedulerConfig {
                mod_log_channel: Some(log_channel),
                ..Default::default()
            },
        );
        gateway.add_member(member(USER, &[MUTE]));
        scheduler
            .schedule_action(PendingActionCreate {
                applicant: USER,
                kind: SanctionKind::Mute,
                roles_to_remove: BTreeSet::from([MUTE]),
                roles_to_add: BTreeSet::new(),
                expires_at_ms: 0,
            })
            .await
            .unwrap();

        completed(scheduler.sweep().await.unwrap());
        let messages = gateway.messages(log_channel);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.contains("automatically unmuted"));
    }

    #[tokio::test]
    async fn overdue_reports_stale_actions() {
        let h = harness();
        h.scheduler.schedule_action(mute_for(&h, 0)).await.unwrap();
        assert!(h.scheduler.overdue().await.unwrap().is_empty());
        h.clock.advance(Duration::from_secs(61));
        assert_eq!(h.scheduler.overdue().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_loop_reverts_due_action() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        h.scheduler.start().await.unwrap();
        h.scheduler.schedule_action(mute_for(&h, HOUR_MS)).await.unwrap();

        h.clock.advance(Duration::from_millis(HOUR_MS));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(h.store.list_actions().await.unwrap().is_empty());
        assert!(h.gateway.roles_of(USER).unwrap().is_empty());
        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_loads_persisted_actions() {
        let h = harness();
        h.gateway.add_member(member(USER, &[MUTE]));
        h.store
            .save_action(&PendingAction {
                id: "persisted".into(),
                applicant: USER,
                kind: SanctionKind::Mute,
                roles_to_remove: BTreeSet::from([MUTE]),
                roles_to_add: BTreeSet::new(),
                expires_at_ms: h.clock.now_ms(),
            })
            .await
            .unwrap();

        h.scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.store.list_actions().await.unwrap().is_empty());
        h.scheduler.stop().await;
    }
}
