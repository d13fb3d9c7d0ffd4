//! Archival pipeline: countdown, optional removal, transcript relay,
//! channel deletion.
//!
//! Archival requests go through an [`ArchivalQueue`] into a single worker
//! task, so sequences never interleave their gateway calls and no request
//! is dropped. Every stage is fail-soft: a transient gateway failure is
//! retried once and then the stage is skipped; a vanished channel aborts
//! the channel stages but the applicant removal and the record deletion
//! still run.

use std::{
    collections::HashSet,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    gatehouse_channels::{HistoryMessage, Identity, NotificationGateway},
    gatehouse_common::{ChannelId, MessageId, UserId},
    tokio::{
        sync::{mpsc, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    store::InterviewStore,
    types::{ArchivalReport, ArchivalTask, render_template},
};

/// Upper bound on transcript length, whatever the configuration says.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 200;

/// Longest message the platform accepts.
const MAX_RELAY_CHARS: usize = 2000;

const EMPTY_MESSAGE_PLACEHOLDER: &str = "[no text content]";

const TRANSCRIPT_HEADER_NAME: &str = "Interview transcript";

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Where transcripts are relayed. `None` skips the relay stage.
    pub log_channel: Option<ChannelId>,
    /// Pause between countdown edits.
    pub countdown_step: Duration,
    pub transcript_limit: usize,
    /// Pause between relayed transcript messages.
    pub relay_delay: Duration,
    pub guild_name: String,
    /// Sent to a denied applicant before removal.
    pub denial_message: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            log_channel: None,
            countdown_step: Duration::from_secs(60),
            transcript_limit: MAX_TRANSCRIPT_MESSAGES,
            relay_delay: Duration::from_secs(1),
            guild_name: "the server".into(),
            denial_message: "Your interview was not approved.".into(),
        }
    }
}

struct Job {
    task: ArchivalTask,
    reply: oneshot::Sender<ArchivalReport>,
}

/// Handle for submitting archival tasks to the worker.
#[derive(Clone)]
pub struct ArchivalQueue {
    tx: mpsc::UnboundedSender<Job>,
    /// Channels queued or being archived.
    in_flight: Arc<Mutex<HashSet<ChannelId>>>,
}

impl ArchivalQueue {
    /// Queue `task` behind any sequence already running.
    ///
    /// A channel can only be queued once; a second request for it fails
    /// with [`Error::AlreadyArchiving`] until the first sequence finishes.
    pub fn enqueue(&self, task: ArchivalTask) -> Result<ArchivalTicket> {
        let channel = task.channel;
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(channel) {
                return Err(Error::AlreadyArchiving { channel });
            }
        }

        let (reply, rx) = oneshot::channel();
        if self.tx.send(Job { task, reply }).is_err() {
            self.release(channel);
            return Err(Error::QueueClosed);
        }
        debug!(channel_id = %channel, "archival queued");
        Ok(ArchivalTicket { channel, rx })
    }

    /// Whether `channel` is queued or currently being archived.
    pub fn is_queued(&self, channel: ChannelId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&channel)
    }

    fn release(&self, channel: ChannelId) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&channel);
    }
}

/// Resolves once the queued sequence has finished.
#[derive(Debug)]
pub struct ArchivalTicket {
    channel: ChannelId,
    rx: oneshot::Receiver<ArchivalReport>,
}

impl ArchivalTicket {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Wait for the report. `None` if the worker stopped first.
    pub async fn wait(self) -> Option<ArchivalReport> {
        self.rx.await.ok()
    }
}

/// Runs archival sequences one at a time.
pub struct ArchivalPipeline {
    gateway: Arc<dyn NotificationGateway>,
    store: Arc<dyn InterviewStore>,
    config: ArchiveConfig,
}

impl ArchivalPipeline {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        store: Arc<dyn InterviewStore>,
        config: ArchiveConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    /// Start the worker. It exits once every [`ArchivalQueue`] clone has
    /// been dropped and the queue is drained.
    pub fn spawn(self) -> (ArchivalQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let queue = ArchivalQueue {
            tx,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        };
        let in_flight = Arc::clone(&queue.in_flight);

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let channel = job.task.channel;
                let report = self.run(&job.task).await;
                in_flight
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&channel);
                let _ = job.reply.send(report);
            }
            debug!("archival worker stopped");
        });
        (queue, handle)
    }

    /// Execute one archival sequence to completion.
    pub async fn run(&self, task: &ArchivalTask) -> ArchivalReport {
        let channel = task.channel;
        let mut report = ArchivalReport::default();
        info!(
            channel_id = %channel,
            applicant_id = ?task.applicant.map(|u| u.get()),
            decision = ?task.decision,
            "archival started"
        );

        let mut channel_gone = false;
        let announcement = countdown_text(5);
        let status = match with_retry("announce", || {
            self.gateway.send_message(channel, &announcement)
        })
        .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                channel_gone = e.is_gone();
                skip(&mut report, "announce", channel, &e);
                None
            },
        };

        let mut removal_done = false;
        if !channel_gone {
            for minutes in [4, 3, 2, 1] {
                tokio::time::sleep(self.config.countdown_step).await;
                if let Some(status) = status
                    && let Err(e) = self.edit_status(channel, status, &countdown_text(minutes)).await
                {
                    channel_gone = e.is_gone();
                    skip(&mut report, "countdown", channel, &e);
                }
                if minutes == 4 && task.remove_applicant {
                    self.remove_applicant(task, &mut report).await;
                    removal_done = true;
                }
                if channel_gone {
                    break;
                }
            }
        }
        if task.remove_applicant && !removal_done {
            self.remove_applicant(task, &mut report).await;
        }

        let mut history = Vec::new();
        if !channel_gone {
            tokio::time::sleep(self.config.countdown_step).await;
            if let Some(status) = status
                && let Err(e) = self.edit_status(channel, status, "Archiving channel now.").await
            {
                channel_gone = e.is_gone();
                skip(&mut report, "countdown", channel, &e);
            }
        }
        if !channel_gone {
            let limit = self.config.transcript_limit.min(MAX_TRANSCRIPT_MESSAGES);
            match with_retry("transcript", || self.gateway.fetch_history(channel, limit)).await {
                Ok(messages) => history = messages,
                Err(e) => {
                    channel_gone = e.is_gone();
                    skip(&mut report, "transcript", channel, &e);
                },
            }
        }

        if !history.is_empty() {
            match self.config.log_channel {
                Some(log_channel) => {
                    self.relay_transcript(task, log_channel, status, &history, &mut report)
                        .await;
                },
                None => debug!(channel_id = %channel, "no log channel configured, transcript not relayed"),
            }
        }

        if !channel_gone {
            match with_retry("delete_channel", || {
                self.gateway.delete_channel(channel, "Interview archived")
            })
            .await
            {
                Ok(()) => report.channel_deleted = true,
                Err(e) => skip(&mut report, "delete_channel", channel, &e),
            }
        }

        match self.store.delete_interview(channel).await {
            Ok(deleted) => report.record_deleted = deleted,
            Err(e) => {
                warn!(channel_id = %channel, error = %e, "failed to delete interview record");
                report.skipped_stages.push("delete_record");
            },
        }

        info!(
            channel_id = %channel,
            skipped = ?report.skipped_stages,
            relayed = report.messages_relayed,
            applicant_removed = report.applicant_removed,
            "archival finished"
        );
        report
    }

    async fn edit_status(
        &self,
        channel: ChannelId,
        status: MessageId,
        text: &str,
    ) -> gatehouse_channels::Result<()> {
        with_retry("countdown", || self.gateway.edit_message(channel, status, text)).await
    }

    /// DM the applicant, then remove them from the guild.
    async fn remove_applicant(&self, task: &ArchivalTask, report: &mut ArchivalReport) {
        let Some(applicant) = task.applicant else {
            debug!(channel_id = %task.channel, "no applicant to remove");
            return;
        };

        let notice = format!(
            "{}\nYou were automatically removed from {}.",
            render_template(&self.config.denial_message, applicant, &self.config.guild_name),
            self.config.guild_name
        );
        if let Err(e) = with_retry("notify", || self.gateway.send_direct(applicant, &notice)).await
        {
            warn!(applicant_id = %applicant, error = %e, "could not notify applicant before removal");
        }

        match with_retry("remove", || {
            self.gateway
                .remove_member(applicant, "Interview denied")
        })
        .await
        {
            Ok(()) => {
                info!(applicant_id = %applicant, "applicant removed");
                report.applicant_removed = true;
            },
            Err(e) if e.is_gone() => {
                info!(applicant_id = %applicant, "applicant already left");
            },
            Err(e) => skip(report, "remove", task.channel, &e),
        }
    }

    async fn relay_transcript(
        &self,
        task: &ArchivalTask,
        log_channel: ChannelId,
        status: Option<MessageId>,
        history: &[HistoryMessage],
        report: &mut ArchivalReport,
    ) {
        let header = self.transcript_header(task).await;
        let header_identity = Identity {
            display_name: TRANSCRIPT_HEADER_NAME.into(),
            avatar_url: header.avatar_url,
        };
        if let Err(e) = with_retry("relay", || {
            self.gateway
                .relay_as_identity(log_channel, &header_identity, &header.text)
        })
        .await
        {
            skip(report, "relay", task.channel, &e);
            return;
        }

        let mut failed = false;
        for message in history.iter().filter(|m| Some(m.id) != status) {
            tokio::time::sleep(self.config.relay_delay).await;
            let content = relay_content(&message.content);
            match with_retry("relay", || {
                self.gateway
                    .relay_as_identity(log_channel, &message.author, &content)
            })
            .await
            {
                Ok(()) => report.messages_relayed += 1,
                Err(e) if e.is_gone() => {
                    warn!(log_channel_id = %log_channel, error = %e, "log channel vanished, transcript relay stopped");
                    failed = true;
                    break;
                },
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "failed to relay transcript message");
                    failed = true;
                },
            }
        }
        if failed {
            report.skipped_stages.push("relay");
        }
    }

    async fn transcript_header(&self, task: &ArchivalTask) -> TranscriptHeader {
        let mention = task.channel.mention();
        let Some(applicant) = task.applicant else {
            return TranscriptHeader {
                text: format!("Transcript of {mention}"),
                avatar_url: None,
            };
        };
        match self.gateway.user_identity(applicant).await {
            Ok(identity) => TranscriptHeader {
                text: format!(
                    "Transcript of {mention} for {} ({applicant})",
                    identity.display_name
                ),
                avatar_url: identity.avatar_url,
            },
            Err(e) => {
                debug!(applicant_id = %applicant, error = %e, "applicant identity unavailable");
                TranscriptHeader {
                    text: format!("Transcript of {mention} for {applicant}"),
                    avatar_url: None,
                }
            },
        }
    }
}

struct TranscriptHeader {
    text: String,
    avatar_url: Option<String>,
}

/// Retry a gateway call once when it fails transiently.
async fn with_retry<T, F, Fut>(stage: &'static str, mut call: F) -> gatehouse_channels::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = gatehouse_channels::Result<T>>,
{
    match call().await {
        Err(e) if e.is_transient() => {
            debug!(stage, error = %e, "transient gateway failure, retrying once");
            call().await
        },
        other => other,
    }
}

fn skip(
    report: &mut ArchivalReport,
    stage: &'static str,
    channel: ChannelId,
    err: &gatehouse_channels::Error,
) {
    warn!(channel_id = %channel, stage, error = %err, "archival stage skipped");
    report.skipped_stages.push(stage);
}

fn countdown_text(minutes: u8) -> String {
    let when = match minutes {
        5 => "five minutes",
        4 => "four minutes",
        3 => "three minutes",
        2 => "two minutes",
        _ => "one minute",
    };
    format!("Archiving channel in {when}.")
}

fn relay_content(content: &str) -> String {
    if content.trim().is_empty() {
        return EMPTY_MESSAGE_PLACEHOLDER.into();
    }
    content.chars().take(MAX_RELAY_CHARS).collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use gatehouse_channels::{FailureKind, GatewayCall, MemberInfo, RecordingGateway};

    use {
        super::*,
        crate::{
            store_memory::InMemoryInterviewStore,
            types::{Decision, InterviewRecord},
        },
    };

    const BOT: UserId = UserId::new(1);
    const APPLICANT: UserId = UserId::new(42);

    struct Harness {
        gateway: Arc<RecordingGateway>,
        store: Arc<InMemoryInterviewStore>,
        log_channel: ChannelId,
        queue: ArchivalQueue,
    }

    fn member(id: UserId) -> MemberInfo {
        MemberInfo {
            user_id: id,
            username: format!("user{id}"),
            display_name: format!("User {id}"),
            avatar_url: Some(format!("https://cdn.example/{id}.png")),
            roles: BTreeSet::new(),
            top_role_position: 0,
            managed_roles: BTreeSet::new(),
        }
    }

    fn harness() -> Harness {
        let gateway = Arc::new(RecordingGateway::new(BOT));
        let store = Arc::new(InMemoryInterviewStore::new());
        let log_channel = gateway.add_channel();
        let pipeline = ArchivalPipeline::new(
            Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
            Arc::clone(&store) as Arc<dyn InterviewStore>,
            ArchiveConfig {
                log_channel: Some(log_channel),
                ..Default::default()
            },
        );
        let (queue, _handle) = pipeline.spawn();
        Harness {
            gateway,
            store,
            log_channel,
            queue,
        }
    }

    async fn open_interview(h: &Harness, applicant: UserId) -> ChannelId {
        h.gateway.add_member(member(applicant));
        let channel = h.gateway.add_channel();
        let welcome = h.gateway.post(channel, BOT, "Welcome!").unwrap();
        h.store
            .create_interview(&InterviewRecord {
                applicant,
                channel,
                welcome_message: welcome,
                current_question: 0,
            })
            .await
            .unwrap();
        channel
    }

    fn task(channel: ChannelId, remove_applicant: bool) -> ArchivalTask {
        ArchivalTask {
            channel,
            applicant: Some(APPLICANT),
            remove_applicant,
            decision: if remove_applicant {
                Decision::Denied
            } else {
                Decision::Approved
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_sequence_relays_transcript_and_cleans_up() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;
        h.gateway.post(channel, APPLICANT, "hello there").unwrap();
        h.gateway.post(channel, APPLICANT, "").unwrap();

        let started = tokio::time::Instant::now();
        let report = h.queue.enqueue(task(channel, false)).unwrap().wait().await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(report.skipped_stages.is_empty());
        assert!(report.channel_deleted);
        assert!(report.record_deleted);
        assert!(!report.applicant_removed);
        assert_eq!(report.messages_relayed, 3);
        assert!(h.gateway.calls_of("remove_member").is_empty());
        assert!(!h.gateway.channel_exists(channel));
        assert!(h.store.get_interview(APPLICANT).await.unwrap().is_none());

        let edits: Vec<String> = h
            .gateway
            .calls_of("edit_message")
            .into_iter()
            .map(|c| match c {
                GatewayCall::EditMessage { content, .. } => content,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(edits, [
            "Archiving channel in four minutes.",
            "Archiving channel in three minutes.",
            "Archiving channel in two minutes.",
            "Archiving channel in one minute.",
            "Archiving channel now.",
        ]);

        let relayed = h.gateway.messages(h.log_channel);
        assert_eq!(relayed[0].author.display_name, TRANSCRIPT_HEADER_NAME);
        assert!(relayed[0].content.contains("User 42 (42)"));
        assert_eq!(
            relayed[0].author.avatar_url.as_deref(),
            Some("https://cdn.example/42.png")
        );
        assert_eq!(relayed[1].content, "Welcome!");
        assert_eq!(relayed[2].content, "hello there");
        assert_eq!(relayed[2].author.display_name, "User 42");
        assert_eq!(relayed[3].content, EMPTY_MESSAGE_PLACEHOLDER);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_happens_at_four_minute_stage() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;

        let report = h.queue.enqueue(task(channel, true)).unwrap().wait().await.unwrap();
        assert!(report.applicant_removed);
        assert!(!h.gateway.is_member(APPLICANT));

        let calls = h.gateway.calls();
        let position =
            |pred: fn(&GatewayCall) -> bool| calls.iter().position(|c| pred(c)).unwrap();
        let four = position(|c| {
            matches!(c, GatewayCall::EditMessage { content, .. } if content.contains("four"))
        });
        let dm = position(|c| matches!(c, GatewayCall::SendDirect { .. }));
        let kick = position(|c| matches!(c, GatewayCall::RemoveMember { .. }));
        let three = position(|c| {
            matches!(c, GatewayCall::EditMessage { content, .. } if content.contains("three"))
        });
        assert!(four < dm && dm < kick && kick < three);
    }

    #[tokio::test(start_paused = true)]
    async fn sequences_for_two_channels_do_not_interleave() {
        let h = harness();
        let first = open_interview(&h, APPLICANT).await;
        let second = open_interview(&h, UserId::new(43)).await;

        let a = h.queue.enqueue(task(first, false)).unwrap();
        let b = h
            .queue
            .enqueue(ArchivalTask {
                applicant: Some(UserId::new(43)),
                ..task(second, false)
            })
            .unwrap();
        assert!(h.queue.is_queued(first) && h.queue.is_queued(second));

        b.wait().await.unwrap();
        a.wait().await.unwrap();

        let calls = h.gateway.calls();
        let last_first = calls
            .iter()
            .rposition(|c| c.channel() == Some(first))
            .unwrap();
        let first_second = calls
            .iter()
            .position(|c| c.channel() == Some(second))
            .unwrap();
        assert!(last_first < first_second);
        assert!(!h.queue.is_queued(first) && !h.queue.is_queued(second));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_request_for_same_channel_is_rejected() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;
        let ticket = h.queue.enqueue(task(channel, false)).unwrap();
        let err = h.queue.enqueue(task(channel, true)).err().unwrap();
        assert!(matches!(err, Error::AlreadyArchiving { .. }));
        ticket.wait().await.unwrap();
        assert!(h.gateway.calls_of("remove_member").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_channel_still_removes_applicant_and_record() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;
        h.gateway.drop_channel(channel);

        let report = h.queue.enqueue(task(channel, true)).unwrap().wait().await.unwrap();
        assert_eq!(report.skipped_stages, ["announce"]);
        assert!(report.applicant_removed);
        assert!(report.record_deleted);
        assert!(!report.channel_deleted);
        assert!(h.gateway.calls_of("fetch_history").is_empty());
        assert!(h.gateway.calls_of("delete_channel").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn channel_vanishing_mid_countdown_aborts_channel_stages() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;
        h.gateway.fail_next("edit_message", FailureKind::Gone);

        let report = h.queue.enqueue(task(channel, false)).unwrap().wait().await.unwrap();
        assert_eq!(report.skipped_stages, ["countdown"]);
        assert_eq!(h.gateway.calls_of("edit_message").len(), 1);
        assert!(h.gateway.calls_of("relay_as_identity").is_empty());
        assert!(report.record_deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_once() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;
        h.gateway.fail_next("delete_channel", FailureKind::Transient);

        let report = h.queue.enqueue(task(channel, false)).unwrap().wait().await.unwrap();
        assert!(report.channel_deleted);
        assert!(report.skipped_stages.is_empty());
        assert_eq!(h.gateway.calls_of("delete_channel").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_transient_failure_skips_the_stage() {
        let h = harness();
        let channel = open_interview(&h, APPLICANT).await;
        h.gateway.fail_next("fetch_history", FailureKind::Transient);
        h.gateway.fail_next("fetch_history", FailureKind::Transient);

        let report = h.queue.enqueue(task(channel, false)).unwrap().wait().await.unwrap();
        assert_eq!(report.skipped_stages, ["transcript"]);
        assert_eq!(report.messages_relayed, 0);
        assert!(report.channel_deleted);
        assert!(report.record_deleted);
    }

    #[test]
    fn relay_content_is_truncated() {
        let long = "x".repeat(MAX_RELAY_CHARS + 10);
        assert_eq!(relay_content(&long).chars().count(), MAX_RELAY_CHARS);
        assert_eq!(relay_content("  "), EMPTY_MESSAGE_PLACEHOLDER);
    }
}
