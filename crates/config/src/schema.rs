/// Config schema types (bot, guild, interviews, moderation, subsystems).
use {
    gatehouse_common::{ChannelId, RoleId},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    pub bot: BotConfig,
    pub guild: GuildConfig,
    pub interviews: InterviewsConfig,
    pub moderation: ModerationConfig,
    pub subsystems: SubsystemsConfig,
}

/// Connection and process-level settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token from the Discord developer portal.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// Command prefixes, checked in order. A mention of the bot also works.
    pub prefixes: Vec<String>,
    /// sqlx connection string, e.g. `sqlite://gatehouse.db?mode=rwc`.
    pub database_url: String,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("prefixes", &self.prefixes)
            .field("database_url", &self.database_url)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            prefixes: vec!["!".into()],
            database_url: "sqlite://gatehouse.db?mode=rwc".into(),
            log_level: "info".into(),
        }
    }
}

/// Ids of the guild the bot gatekeeps and the roles/channels it touches.
///
/// Id `0` means "not configured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    pub guild_id: u64,
    /// Role held by applicants while their interview is pending.
    pub gatekeeper_role: RoleId,
    /// Role granted on approval.
    pub member_role: RoleId,
    pub mod_roles: Vec<RoleId>,
    /// Roles that may read interview channels but not moderate them.
    pub helper_roles: Vec<RoleId>,
    /// When set, regular members can read (not write) interview channels.
    pub everyone_can_see_interviews: bool,
    /// Role hidden from interview channels when they are publicly readable.
    pub hide_interview_role: Option<RoleId>,
    /// Category new interview channels are created under.
    pub interview_category: Option<ChannelId>,
    /// Public channel where approvals are announced.
    pub welcome_channel: ChannelId,
    /// Channel that receives archived interview transcripts.
    pub interview_log_channel: ChannelId,
}

/// Interview wording and archival pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewsConfig {
    /// Questions sent one at a time when the applicant reacts to the welcome message.
    pub questions: Vec<String>,
    /// Welcome message template. `{mention}` is replaced with the applicant mention.
    pub welcome_message: String,
    /// Reaction placed on the welcome message that the applicant clicks to advance.
    pub seed_emoji: String,
    /// Public announcement on approval. Supports `{mention}` and `{guild}`.
    pub approval_message: String,
    /// Posted in the interview channel on denial. Supports `{mention}` and `{guild}`.
    pub denial_message: String,
    /// Seconds between archival countdown updates.
    pub countdown_step_secs: u64,
    /// Maximum number of messages captured in a transcript (capped at 200).
    pub transcript_limit: usize,
    /// Pause between relayed transcript messages, in milliseconds.
    pub relay_delay_ms: u64,
}

impl Default for InterviewsConfig {
    fn default() -> Self {
        Self {
            questions: vec![
                "How did you find this server?".into(),
                "What are your pronouns?".into(),
                "Have you read and do you agree to the rules?".into(),
            ],
            welcome_message: "Thanks for checking out our server, {mention}! React to this \
                              message to get your first question, and react again for the \
                              next one. A moderator will review your answers."
                .into(),
            seed_emoji: "\u{2705}".into(),
            approval_message: "Welcome to {guild}, {mention}!".into(),
            denial_message: "We're really sorry, {mention}, but we do not think you are a good \
                             fit for {guild} at this time."
                .into(),
            countdown_step_secs: 60,
            transcript_limit: 200,
            relay_delay_ms: 1_000,
        }
    }
}

/// Timed sanctions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub mute_role: RoleId,
    /// Channel that receives moderation announcements. Optional.
    pub mod_log_channel: Option<ChannelId>,
    /// Interval of the backstop sweep over all pending actions.
    pub sweep_interval_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            mute_role: RoleId::default(),
            mod_log_channel: None,
            sweep_interval_secs: 30,
        }
    }
}

/// Which subsystems get wired into the event dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsystemsConfig {
    pub interviews: bool,
    pub moderation: bool,
}

impl Default for SubsystemsConfig {
    fn default() -> Self {
        Self {
            interviews: true,
            moderation: true,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = GatehouseConfig::default();
        assert_eq!(cfg.bot.prefixes, vec!["!"]);
        assert_eq!(cfg.interviews.countdown_step_secs, 60);
        assert_eq!(cfg.interviews.transcript_limit, 200);
        assert_eq!(cfg.moderation.sweep_interval_secs, 30);
        assert!(cfg.subsystems.interviews);
        assert!(cfg.subsystems.moderation);
    }

    #[test]
    fn deserialize_partial_toml() {
        let raw = r#"
            [bot]
            token = "abc"

            [guild]
            guild_id = 10
            gatekeeper_role = 11
            mod_roles = [12, 13]

            [subsystems]
            moderation = false
        "#;
        let cfg: GatehouseConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.bot.token.expose_secret(), "abc");
        assert_eq!(cfg.guild.gatekeeper_role, RoleId::new(11));
        assert_eq!(cfg.guild.mod_roles, vec![RoleId::new(12), RoleId::new(13)]);
        assert!(cfg.subsystems.interviews);
        assert!(!cfg.subsystems.moderation);
        assert_eq!(cfg.interviews.questions.len(), 3);
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = BotConfig {
            token: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
