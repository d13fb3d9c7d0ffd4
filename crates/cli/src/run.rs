//! Wire the stores, the scheduler, both subsystems and the Discord
//! transport together, then run until the gateway closes or Ctrl-C.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use {
    anyhow::bail,
    gatehouse_bot::{DispatchConfig, Dispatcher},
    gatehouse_channels::{EventSink, NotificationGateway},
    gatehouse_common::{Clock, SystemClock},
    gatehouse_config::{Diagnostic, GatehouseConfig, Severity, validate::check_semantics},
    gatehouse_discord::{DiscordGateway, DiscordHandler},
    gatehouse_interviews::{
        ArchivalPipeline, ArchiveConfig, InterviewWorkflow, WorkflowConfig,
        store::InterviewStore, store_sqlite::SqliteInterviewStore,
    },
    gatehouse_sanctions::{
        moderation::{self, Moderation},
        service::{SchedulerConfig, TimedActionScheduler},
        store::SanctionStore, store_sqlite::SqliteSanctionStore,
    },
    secrecy::ExposeSecret,
    serenity::all::{Client, GuildId, Http},
    tracing::{error, info, warn},
};

use crate::db_commands::open_pool;

/// Used in messages when the guild name cannot be fetched.
const FALLBACK_GUILD_NAME: &str = "the server";

pub async fn run(config: GatehouseConfig) -> anyhow::Result<()> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    check_semantics(&config, &mut diagnostics);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => {},
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        bail!("configuration has errors; run `gatehouse check-config` for details");
    }
    if config.guild.guild_id == 0 {
        bail!("guild.guild_id is not configured");
    }

    let pool = open_pool(&config).await?;
    let token = config.bot.token.expose_secret().clone();
    let guild = GuildId::new(config.guild.guild_id);

    let http = Arc::new(Http::new(&token));
    let gateway: Arc<dyn NotificationGateway> =
        Arc::new(DiscordGateway::connect(Arc::clone(&http), guild).await?);

    let guild_name = match guild.to_partial_guild(&http).await {
        Ok(partial) => partial.name,
        Err(e) => {
            warn!(error = %e, "could not fetch guild name");
            FALLBACK_GUILD_NAME.to_string()
        },
    };
    info!(guild_id = %guild, guild_name = %guild_name, "gatekeeping guild");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sanction_store: Arc<dyn SanctionStore> = Arc::new(SqliteSanctionStore::with_pool(pool.clone()));
    let interview_store: Arc<dyn InterviewStore> = Arc::new(SqliteInterviewStore::with_pool(pool));

    let scheduler = TimedActionScheduler::new(
        Arc::clone(&sanction_store),
        Arc::clone(&gateway),
        Arc::clone(&clock),
        scheduler_config(&config),
    );

    let mut dispatcher = Dispatcher::new(Arc::clone(&gateway), dispatch_config(&config));
    let mut archive_worker = None;

    if config.subsystems.moderation {
        scheduler.start().await?;
        let moderation = Moderation::new(
            Arc::clone(&scheduler),
            sanction_store,
            Arc::clone(&gateway),
            clock,
            moderation_config(&config),
        );
        dispatcher = dispatcher.with_moderation(Arc::new(moderation));
    } else {
        info!("moderation subsystem disabled");
    }

    if config.subsystems.interviews {
        let pipeline = ArchivalPipeline::new(
            Arc::clone(&gateway),
            Arc::clone(&interview_store),
            archive_config(&config, &guild_name),
        );
        let (queue, handle) = pipeline.spawn();
        archive_worker = Some(handle);
        let workflow = InterviewWorkflow::new(
            interview_store,
            Arc::clone(&gateway),
            queue,
            workflow_config(&config, &guild_name),
        );
        dispatcher = dispatcher.with_interviews(Arc::new(workflow));
    } else {
        info!("interviews subsystem disabled");
    }

    let sink: Arc<dyn EventSink> = Arc::new(dispatcher);
    let handler = DiscordHandler { guild, sink };

    let mut client = Client::builder(&token, DiscordHandler::intents())
        .event_handler(handler)
        .await?;
    let shard_manager = Arc::clone(&client.shard_manager);

    info!("connecting to discord");
    let outcome = tokio::select! {
        result = client.start() => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            shard_manager.shutdown_all().await;
            signal.map_err(anyhow::Error::from)
        },
    };

    scheduler.stop().await;
    if let Some(handle) = archive_worker {
        // Unfinished archival sequences are abandoned; their records remain.
        handle.abort();
    }
    info!("gatehouse stopped");
    outcome
}

fn scheduler_config(config: &GatehouseConfig) -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_secs(config.moderation.sweep_interval_secs.max(1)),
        mod_log_channel: config.moderation.mod_log_channel,
    }
}

fn moderation_config(config: &GatehouseConfig) -> moderation::ModerationConfig {
    moderation::ModerationConfig {
        mute_role: config.moderation.mute_role,
        mod_log_channel: config.moderation.mod_log_channel,
    }
}

fn dispatch_config(config: &GatehouseConfig) -> DispatchConfig {
    DispatchConfig {
        prefixes: config.bot.prefixes.clone(),
        mod_roles: config.guild.mod_roles.iter().copied().collect::<BTreeSet<_>>(),
    }
}

fn archive_config(config: &GatehouseConfig, guild_name: &str) -> ArchiveConfig {
    let interviews = &config.interviews;
    ArchiveConfig {
        log_channel: Some(config.guild.interview_log_channel),
        countdown_step: Duration::from_secs(interviews.countdown_step_secs),
        transcript_limit: interviews.transcript_limit,
        relay_delay: Duration::from_millis(interviews.relay_delay_ms),
        guild_name: guild_name.to_string(),
        denial_message: interviews.denial_message.clone(),
    }
}

fn workflow_config(config: &GatehouseConfig, guild_name: &str) -> WorkflowConfig {
    let guild = &config.guild;
    let interviews = &config.interviews;
    WorkflowConfig {
        gatekeeper_role: guild.gatekeeper_role,
        member_role: guild.member_role,
        mod_roles: guild.mod_roles.clone(),
        helper_roles: guild.helper_roles.clone(),
        everyone_can_see: guild.everyone_can_see_interviews,
        hide_interview_role: guild.hide_interview_role,
        category: guild.interview_category,
        welcome_channel: guild.welcome_channel,
        questions: interviews.questions.clone(),
        welcome_message: interviews.welcome_message.clone(),
        seed_emoji: interviews.seed_emoji.clone(),
        approval_message: interviews.approval_message.clone(),
        denial_message: interviews.denial_message.clone(),
        guild_name: guild_name.to_string(),
    }
}
