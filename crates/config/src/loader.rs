use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_value,
    error::{Context, Error, Result},
    schema::RelayConfig,
};

/// Standard config file names, checked in order.
pub const CONFIG_FILENAMES: &[&str] = &["relay.toml", "relay.yaml", "relay.yml", "relay.json"];

const APP_NAME: &str = "claude-relay";

/// Keys copied from the environment into the worker's environment when the
/// config does not set them.
const FORWARDED_SECRETS: &[&str] = &["ANTHROPIC_API_KEY", "OPENAI_API_KEY"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let value = load_config_value(path)?;
    serde_json::from_value(value).map_err(|e| Error::parse(path, e))
}

/// Load the config file as a generic value tree with `${VAR}` expanded.
pub fn load_config_value(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut value = parse_value(&raw, path)?;
    substitute_value(&mut value);
    Ok(value)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./relay.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/relay.{toml,yaml,yml,json}`
///
/// Returns `RelayConfig::default()` if no config file is found or the file
/// cannot be parsed.
pub fn discover_and_load() -> RelayConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    RelayConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// User-global config directory (`~/.config/claude-relay/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

/// Directory for runtime data such as the audit log.
///
/// Falls back to `./.claude-relay` when no home directory can be determined.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".claude-relay"))
}

/// Path a new config file should be written to.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()
        .context("cannot determine the user config directory")?
        .join(CONFIG_FILENAMES[0]))
}

/// Apply environment-variable overrides from the process environment.
pub fn apply_env_overrides(config: &mut RelayConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Apply environment-variable overrides using `lookup`.
///
/// Empty values are ignored. Values that fail to parse are reported and
/// ignored.
pub fn apply_env_overrides_with(
    config: &mut RelayConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("RELAY_GROUP_ID") {
        config.auth.group_id = Some(v);
    }
    if let Some(v) = get("RELAY_SENDER_ID") {
        config.auth.sender_id = Some(v);
    }
    if let Some(v) = get("BRIDGE_COMMAND") {
        config.bridge.program = v;
    }
    if let Some(v) = get("BRIDGE_WORKING_DIR") {
        config.bridge.working_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = parsed(&get, "BRIDGE_TIMEOUT") {
        config.bridge.timeout_secs = v;
    }
    if let Some(v) = parsed(&get, "TRANSCRIBE_TIMEOUT") {
        config.bridge.transcribe_timeout_secs = v;
    }
    if let Some(v) = parsed(&get, "MAX_OUTPUT") {
        config.reply.max_length = v;
    }
    if let Some(v) = parsed(&get, "DEDUP_CAPACITY") {
        config.dedup.capacity = v;
    }
    if let Some(v) = get("AUDIT_LOG_ENABLED") {
        match parse_bool(&v) {
            Some(enabled) => config.audit.enabled = enabled,
            None => warn!(var = "AUDIT_LOG_ENABLED", value = %v, "ignoring invalid boolean"),
        }
    }
    if let Some(v) = get("AUDIT_LOG_PATH") {
        config.audit.path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("SIDECAR_DIR") {
        config.sidecar.dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("SIDECAR_AUTH_DIR") {
        config.sidecar.auth_dir = Some(PathBuf::from(v));
    }

    for key in FORWARDED_SECRETS {
        if config.bridge.env.contains_key(*key) {
            continue;
        }
        if let Some(v) = get(key) {
            config.bridge.env.insert((*key).to_string(), Secret::new(v));
        }
    }
}

fn parsed<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = get(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring invalid numeric override");
            None
        },
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse raw file contents into a value tree, choosing the format by extension.
pub(crate) fn parse_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw).map_err(|e| Error::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| Error::parse(path, e))
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e))?;
            serde_json::to_value(v).map_err(|e| Error::parse(path, e))
        },
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}
