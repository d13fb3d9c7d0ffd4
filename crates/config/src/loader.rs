use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{env_subst::substitute_env, schema::GatehouseConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "gatehouse.toml",
    "gatehouse.yaml",
    "gatehouse.yml",
    "gatehouse.json",
];

const TOKEN_ENV: &str = "GATEHOUSE_TOKEN";
const DATABASE_URL_ENV: &str = "GATEHOUSE_DATABASE_URL";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<GatehouseConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let mut value = parse_value(&raw, path)?;
    for missing in substitute_env(&mut value) {
        warn!(path = %missing.path, var = %missing.var, "environment variable not set, placeholder left as written");
    }
    Ok(serde_json::from_value(value)?)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./gatehouse.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/gatehouse/gatehouse.{toml,yaml,yml,json}` (user-global)
///
/// Returns `GatehouseConfig::default()` if no config file is found or the
/// file fails to parse. Environment overrides are applied either way.
pub fn discover_and_load() -> GatehouseConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                GatehouseConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        GatehouseConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/gatehouse/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "gatehouse").map(|d| d.config_dir().to_path_buf())
}

/// Apply `GATEHOUSE_TOKEN` and `GATEHOUSE_DATABASE_URL` on top of the file.
pub fn apply_env_overrides(config: &mut GatehouseConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(
    config: &mut GatehouseConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
        info!("using bot token from {TOKEN_ENV}");
        config.bot.token = Secret::new(token);
    }
    if let Some(url) = lookup(DATABASE_URL_ENV).filter(|u| !u.is_empty()) {
        info!(database_url = %url, "using database from {DATABASE_URL_ENV}");
        config.bot.database_url = url;
    }
}

/// Parse any supported format into one value tree so placeholders are
/// resolved the same way regardless of format.
fn parse_value(raw: &str, path: &Path) -> anyhow::Result<Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(serde_json::to_value(toml::from_str::<toml::Value>(raw)?)?),
        "yaml" | "yml" => Ok(serde_json::to_value(serde_yaml::from_str::<serde_yaml::Value>(
            raw,
        )?)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::io::Write};

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_toml() {
        let file = write_temp(
            ".toml",
            "[guild]\nguild_id = 1\nmember_role = 2\n\n[moderation]\nmute_role = 3\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.guild.guild_id, 1);
        assert_eq!(cfg.guild.member_role.get(), 2);
        assert_eq!(cfg.moderation.mute_role.get(), 3);
    }

    #[test]
    fn loads_yaml() {
        let file = write_temp(".yaml", "subsystems:\n  interviews: false\n");
        let cfg = load_config(file.path()).unwrap();
        assert!(!cfg.subsystems.interviews);
        assert!(cfg.subsystems.moderation);
    }

    #[test]
    fn loads_json() {
        let file = write_temp(".json", r#"{"bot": {"prefixes": ["?", "gh!"]}}"#);
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.bot.prefixes, vec!["?", "gh!"]);
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = write_temp(".ini", "a=b");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn placeholders_resolve_after_parsing() {
        let file = write_temp(
            ".toml",
            "[guild]\nguild_id = \"${GATEHOUSE_LOADER_UNSET_ID:-77}\"\n\n\
             [bot]\ntoken = \"${GATEHOUSE_LOADER_UNSET_TOKEN}\"\n",
        );
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.guild.guild_id, 77);
        assert_eq!(cfg.bot.token.expose_secret(), "${GATEHOUSE_LOADER_UNSET_TOKEN}");
    }

    #[test]
    fn env_overrides_token_and_database() {
        let mut cfg = GatehouseConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            TOKEN_ENV => Some("from-env".into()),
            DATABASE_URL_ENV => Some("sqlite::memory:".into()),
            _ => None,
        });
        assert_eq!(cfg.bot.token.expose_secret(), "from-env");
        assert_eq!(cfg.bot.database_url, "sqlite::memory:");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = GatehouseConfig::default();
        apply_env_overrides_with(&mut cfg, |_| Some(String::new()));
        assert_eq!(cfg.bot.database_url, "sqlite://gatehouse.db?mode=rwc");
    }
}
