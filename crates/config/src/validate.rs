//! Configuration validation engine.
//!
//! Detects unknown/misspelled fields in any supported format, reports type
//! errors, and checks that each enabled subsystem has the ids it needs.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use {secrecy::ExposeSecret, serde_json::Value};

use crate::{env_subst::substitute_env, loader::apply_env_overrides, schema::GatehouseConfig};

/// Hard ceiling on transcript capture.
const MAX_TRANSCRIPT_LIMIT: usize = 200;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unresolved-env", "unknown-field", "type-error",
    /// "missing-id", "range", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "guild.member_role"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "bot",
            Struct(HashMap::from([
                ("token", Leaf),
                ("prefixes", Leaf),
                ("database_url", Leaf),
                ("log_level", Leaf),
            ])),
        ),
        (
            "guild",
            Struct(HashMap::from([
                ("guild_id", Leaf),
                ("gatekeeper_role", Leaf),
                ("member_role", Leaf),
                ("mod_roles", Leaf),
                ("helper_roles", Leaf),
                ("everyone_can_see_interviews", Leaf),
                ("hide_interview_role", Leaf),
                ("interview_category", Leaf),
                ("welcome_channel", Leaf),
                ("interview_log_channel", Leaf),
            ])),
        ),
        (
            "interviews",
            Struct(HashMap::from([
                ("questions", Leaf),
                ("welcome_message", Leaf),
                ("seed_emoji", Leaf),
                ("approval_message", Leaf),
                ("denial_message", Leaf),
                ("countdown_step_secs", Leaf),
                ("transcript_limit", Leaf),
                ("relay_delay_ms", Leaf),
            ])),
        ),
        (
            "moderation",
            Struct(HashMap::from([
                ("mute_role", Leaf),
                ("mod_log_channel", Leaf),
                ("sweep_interval_secs", Leaf),
            ])),
        ),
        (
            "subsystems",
            Struct(HashMap::from([("interviews", Leaf), ("moderation", Leaf)])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
///
/// Environment overrides are applied before the semantic checks so a token
/// supplied through `GATEHOUSE_TOKEN` counts as configured.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        let mut config = GatehouseConfig::default();
        apply_env_overrides(&mut config);
        let mut diagnostics = vec![Diagnostic::new(
            Severity::Info,
            "file-ref",
            "",
            "no config file found; using defaults",
        )];
        check_semantics(&config, &mut diagnostics);
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let format = Format::from_path(&actual_path);
    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => validate_str(&content, format, true),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate a TOML string without touching the file system or environment.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    validate_str(toml_str, Format::Toml, false)
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }

    fn parse_value(self, raw: &str) -> Result<Value, String> {
        match self {
            Self::Toml => toml::from_str::<toml::Value>(raw)
                .map_err(|e| format!("TOML syntax error: {e}"))
                .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
            Self::Yaml => serde_yaml::from_str::<serde_yaml::Value>(raw)
                .map_err(|e| format!("YAML syntax error: {e}"))
                .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
            Self::Json => serde_json::from_str(raw).map_err(|e| format!("JSON syntax error: {e}")),
        }
    }
}

fn validate_str(raw: &str, format: Format, with_env: bool) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let mut value = match format.parse_value(raw) {
        Ok(v) => v,
        Err(message) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", message));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Placeholders
    if with_env {
        for missing in substitute_env(&mut value) {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "unresolved-env",
                &missing.path,
                format!("${{{}}} is not set; the placeholder is used as written", missing.var),
            ));
        }
    }

    // 3. Unknown fields
    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    // 4. Types, then semantics on the parsed config
    match serde_json::from_value::<GatehouseConfig>(value) {
        Ok(mut config) => {
            if with_env {
                apply_env_overrides(&mut config);
            }
            check_semantics(&config, &mut diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            "at top level "
        } else {
            ""
        };
        let msg = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
            None => format!("unknown field {level}"),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            msg.trim(),
        ));
    }
}

/// Checks that depend on which subsystems are enabled.
pub fn check_semantics(config: &GatehouseConfig, diagnostics: &mut Vec<Diagnostic>) {
    let missing = |diagnostics: &mut Vec<Diagnostic>, path: &str, why: &str| {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing-id",
            path,
            format!("must be set {why}").trim_end(),
        ));
    };

    if config.bot.token.expose_secret().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing-id",
            "bot.token",
            "no bot token; set bot.token or GATEHOUSE_TOKEN",
        ));
    }
    if config.bot.prefixes.iter().all(String::is_empty) {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "range",
            "bot.prefixes",
            "no prefixes; commands only work by mentioning the bot",
        ));
    }
    if config.guild.guild_id == 0 {
        missing(diagnostics, "guild.guild_id", "");
    }

    let subsystems = config.subsystems;
    if !subsystems.interviews && !subsystems.moderation {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "range",
            "subsystems",
            "every subsystem is disabled; the bot will ignore all events",
        ));
    }

    if subsystems.interviews {
        let why = "when interviews are enabled";
        let guild = &config.guild;
        if guild.gatekeeper_role.get() == 0 {
            missing(diagnostics, "guild.gatekeeper_role", why);
        }
        if guild.member_role.get() == 0 {
            missing(diagnostics, "guild.member_role", why);
        }
        if guild.welcome_channel.get() == 0 {
            missing(diagnostics, "guild.welcome_channel", why);
        }
        if guild.interview_log_channel.get() == 0 {
            missing(diagnostics, "guild.interview_log_channel", why);
        }

        let interviews = &config.interviews;
        if interviews.questions.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "range",
                "interviews.questions",
                "no questions configured; reactions will never advance",
            ));
        }
        if interviews.transcript_limit == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "range",
                "interviews.transcript_limit",
                "must be at least 1",
            ));
        } else if interviews.transcript_limit > MAX_TRANSCRIPT_LIMIT {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "range",
                "interviews.transcript_limit",
                format!("capped at {MAX_TRANSCRIPT_LIMIT}"),
            ));
        }
        if interviews.countdown_step_secs == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "range",
                "interviews.countdown_step_secs",
                "0 deletes interview channels without a countdown",
            ));
        }
    }

    if subsystems.moderation {
        if config.moderation.mute_role.get() == 0 {
            missing(
                diagnostics,
                "moderation.mute_role",
                "when moderation is enabled",
            );
        }
        if config.moderation.sweep_interval_secs == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "range",
                "moderation.sweep_interval_secs",
                "must be at least 1",
            ));
        }
    }

    if (subsystems.interviews || subsystems.moderation) && config.guild.mod_roles.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "missing-id",
            "guild.mod_roles",
            "no moderator roles; nobody can run moderator commands",
        ));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    const VALID: &str = r#"
        [bot]
        token = "t"
        prefixes = ["!"]

        [guild]
        guild_id = 1
        gatekeeper_role = 2
        member_role = 3
        mod_roles = [4]
        welcome_channel = 5
        interview_log_channel = 6

        [moderation]
        mute_role = 7
        mod_log_channel = 8
    "#;

    fn paths_with(result: &ValidationResult, category: &str) -> Vec<String> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.category == category)
            .map(|d| d.path.clone())
            .collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("guild", "guild"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("mute_role", "mute_rol"), 1);
        assert_eq!(levenshtein("prefixes", "prefixis"), 1);
    }

    #[test]
    fn suggest_finds_close_match() {
        assert_eq!(
            suggest("moderaton", &["moderation", "interviews"], 3),
            Some("moderation")
        );
        assert_eq!(suggest("zzzzzzzz", &["moderation"], 3), None);
    }

    #[test]
    fn valid_config_has_no_errors() {
        let result = validate_toml_str(VALID);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn unknown_top_level_key_with_suggestion() {
        let result = validate_toml_str(&format!("{VALID}\n[moderaton]\nmute_role = 1\n"));
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.path == "moderaton")
            .unwrap();
        assert_eq!(diag.category, "unknown-field");
        assert!(diag.message.contains("did you mean \"moderation\""));
        assert!(diag.message.contains("at top level"));
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let raw = VALID.replace("mute_role = 7", "mute_rol = 7");
        let result = validate_toml_str(&raw);
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.path == "moderation.mute_rol")
            .unwrap();
        assert!(diag.message.contains("mute_role"));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("[bot\ntoken = ");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error_detected() {
        let raw = VALID.replace("guild_id = 1", "guild_id = \"one\"");
        let result = validate_toml_str(&raw);
        assert_eq!(paths_with(&result, "type-error").len(), 1);
    }

    #[test]
    fn interviews_require_roles_and_channels() {
        let result = validate_toml_str("[bot]\ntoken = \"t\"\n[guild]\nguild_id = 1\nmod_roles = [4]\n[moderation]\nmute_role = 7\n");
        let missing = paths_with(&result, "missing-id");
        for path in [
            "guild.gatekeeper_role",
            "guild.member_role",
            "guild.welcome_channel",
            "guild.interview_log_channel",
        ] {
            assert!(missing.contains(&path.to_string()), "missing {path}");
        }
    }

    #[test]
    fn disabled_subsystem_skips_its_checks() {
        let raw = "[bot]\ntoken = \"t\"\n[guild]\nguild_id = 1\nmod_roles = [4]\n\
                   [moderation]\nmute_role = 7\n[subsystems]\ninterviews = false\n";
        let result = validate_toml_str(raw);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_token_is_error() {
        let raw = VALID.replace("token = \"t\"", "");
        let result = validate_toml_str(&raw);
        assert!(paths_with(&result, "missing-id").contains(&"bot.token".to_string()));
    }

    #[test]
    fn oversized_transcript_limit_warned() {
        let result = validate_toml_str(&format!("{VALID}\n[interviews]\ntranscript_limit = 500\n"));
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.path == "interviews.transcript_limit")
            .unwrap();
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn yaml_file_unknown_field() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"subsystems:\n  interview: true\n").unwrap();
        let result = validate(Some(file.path()));
        assert_eq!(result.config_path.as_deref(), Some(file.path()));
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "subsystems.interview");
        assert!(diag.message.contains("interviews"));
    }

    #[test]
    fn unset_placeholder_is_warned_at_its_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let raw = format!(
            "{}\n[interviews]\nwelcome_message = \"${{GATEHOUSE_VALIDATE_UNSET}}\"\n",
            VALID.replace("mute_role = 7", "mute_role = \"${GATEHOUSE_VALIDATE_UNSET_ROLE:-7}\"")
        );
        file.write_all(raw.as_bytes()).unwrap();
        let result = validate(Some(file.path()));
        assert_eq!(paths_with(&result, "unresolved-env"), vec![
            "interviews.welcome_message".to_string()
        ]);
        assert!(paths_with(&result, "type-error").is_empty());
    }

    #[test]
    fn unreadable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate(Some(&dir.path().join("gatehouse.toml")));
        assert!(result.has_errors());
    }
}
