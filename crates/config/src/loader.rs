use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::BotConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "botlink.toml",
    "botlink.yaml",
    "botlink.yml",
    "botlink.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BotConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config.
///
/// Search order:
/// 1. `explicit` (the `--config` flag), when given
/// 2. `./botlink.{toml,yaml,yml,json}` (project-local)
/// 3. `~/.config/botlink/botlink.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `BotConfig::default()` when nothing is found or the file
/// fails to parse. Env overrides are applied in every case.
pub fn discover_and_load(explicit: Option<&Path>) -> BotConfig {
    let path = explicit.map(Path::to_path_buf).or_else(find_config_file);
    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                BotConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            BotConfig::default()
        },
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

/// Returns the user-global config directory (`~/.config/botlink/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "botlink").map(|d| d.config_dir().to_path_buf())
}

/// Apply `BOTLINK_*` environment overrides on top of the parsed file.
pub fn apply_env_overrides(config: &mut BotConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut BotConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("BOTLINK_GATEWAY_URL") {
        config.gateway.url = url;
    }
    if let Some(token) = get("BOTLINK_ACCESS_TOKEN") {
        config.gateway.access_token = Some(Secret::new(token));
    }
    if let Some(owner) = get("BOTLINK_OWNER_ID") {
        config.owner.user_id = Some(owner);
    }
    if let Some(dir) = get("BOTLINK_DATA_DIR") {
        config.storage.data_dir = PathBuf::from(dir);
    }
}

/// Parse raw config text, picking the format from the file extension.
pub fn parse_config(raw: &str, path: &Path) -> Result<BotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {secrecy::ExposeSecret, tempfile::TempDir};

    use super::*;

    #[test]
    fn parses_each_supported_format() {
        let toml = parse_config(
            "[owner]\nuser_id = \"10001\"",
            Path::new("botlink.toml"),
        )
        .unwrap();
        assert_eq!(toml.owner.user_id.as_deref(), Some("10001"));

        let yaml = parse_config(
            "dispatch:\n  max_concurrent_handlers: 0\n",
            Path::new("botlink.yml"),
        )
        .unwrap();
        assert_eq!(yaml.dispatch.max_concurrent_handlers, 0);

        let json = parse_config(
            r#"{"gateway":{"url":"ws://10.0.0.2:3001"}}"#,
            Path::new("botlink.json"),
        )
        .unwrap();
        assert_eq!(json.gateway.url, "ws://10.0.0.2:3001");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = parse_config("", Path::new("botlink.ini")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/var/lib/botlink\"\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.storage.data_dir, PathBuf::from("/var/lib/botlink"));
    }

    #[test]
    fn broken_explicit_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.toml");
        std::fs::write(&path, "[gateway\nurl = ").unwrap();

        let cfg = discover_and_load(Some(&path));
        assert_eq!(cfg.dispatch.max_concurrent_handlers, 64);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Path::new("/nonexistent/botlink.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = BotConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "BOTLINK_GATEWAY_URL" => Some("ws://gw:3001".into()),
            "BOTLINK_ACCESS_TOKEN" => Some("tok".into()),
            "BOTLINK_OWNER_ID" => Some("42".into()),
            "BOTLINK_DATA_DIR" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(cfg.gateway.url, "ws://gw:3001");
        assert_eq!(
            cfg.gateway
                .access_token
                .as_ref()
                .map(|t| t.expose_secret().clone()),
            Some("tok".to_string())
        );
        assert_eq!(cfg.owner.user_id.as_deref(), Some("42"));
        // Blank values are ignored.
        assert_eq!(cfg.storage.data_dir, PathBuf::from("data"));
    }
}
