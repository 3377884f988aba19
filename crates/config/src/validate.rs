//! Configuration validation.
//!
//! Detects unknown or misspelled fields, type errors, and settings that would
//! make the relay unusable.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{loader, schema::RelayConfig};

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
    /// "syntax", "unknown-field", "type-error", "auth", "limits", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "bridge.timeout_secs"
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
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Expected shape of the configuration tree.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys with scalar values (`bridge.env`).
    Map,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "auth",
            Struct(HashMap::from([("group_id", Leaf), ("sender_id", Leaf)])),
        ),
        (
            "bridge",
            Struct(HashMap::from([
                ("program", Leaf),
                ("args", Leaf),
                ("working_dir", Leaf),
                ("timeout_secs", Leaf),
                ("transcribe_timeout_secs", Leaf),
                ("env", Map),
            ])),
        ),
        ("reply", Struct(HashMap::from([("max_length", Leaf)]))),
        ("dedup", Struct(HashMap::from([("capacity", Leaf)]))),
        (
            "audit",
            Struct(HashMap::from([("enabled", Leaf), ("path", Leaf)])),
        ),
        (
            "sidecar",
            Struct(HashMap::from([
                ("program", Leaf),
                ("args", Leaf),
                ("dir", Leaf),
                ("auth_dir", Leaf),
                ("ack_timeout_secs", Leaf),
            ])),
        ),
    ]))
}

/// Levenshtein edit distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

/// Validate the config at `path`, or the discovered config when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path.map(Path::to_path_buf).or_else(loader::find_config_file) else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match loader::load_config_value(&config_path) {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                e.to_string(),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Validate a TOML document without touching the filesystem.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    match loader::parse_value(toml_str, Path::new("relay.toml")) {
        Ok(value) => validate_value(&value),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                e.to_string(),
            )],
            config_path: None,
        },
    }
}

/// Validate an already-parsed value tree.
#[must_use]
pub fn validate_value(value: &serde_json::Value) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<RelayConfig>(value.clone()) {
        Ok(config) => check_config(&config, &mut diagnostics),
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
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child, child_schema, &path, diagnostics);
            continue;
        }
        let message = match suggest(key, &known, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

/// Semantic checks on a config that deserialized cleanly.
///
/// Also used by the binary after environment overrides are applied.
pub fn check_config(config: &RelayConfig, diagnostics: &mut Vec<Diagnostic>) {
    let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());

    if config.auth.group_id.is_none() && config.auth.sender_id.is_some() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "auth",
            "auth.sender_id",
            "sender_id is ignored without group_id; only the self chat is accepted",
        ));
    }
    if blank(&config.auth.group_id) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "auth",
            "auth.group_id",
            "blank group_id is treated as unset",
        ));
    }
    if config.bridge.program.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "limits",
            "bridge.program",
            "worker program must not be empty",
        ));
    }
    if config.sidecar.program.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "limits",
            "sidecar.program",
            "sidecar program must not be empty",
        ));
    }

    for (path, value) in [
        ("bridge.timeout_secs", config.bridge.timeout_secs),
        (
            "bridge.transcribe_timeout_secs",
            config.bridge.transcribe_timeout_secs,
        ),
        ("sidecar.ack_timeout_secs", config.sidecar.ack_timeout_secs),
    ] {
        if value == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "limits",
                path,
                "timeout must be greater than zero",
            ));
        }
    }

    if config.reply.max_length == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "limits",
            "reply.max_length",
            "max_length must be greater than zero",
        ));
    }
    if config.dedup.capacity == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "limits",
            "dedup.capacity",
            "capacity must be greater than zero",
        ));
    } else if config.dedup.capacity < 100 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "limits",
            "dedup.capacity",
            "a small dedup capacity may let echoed replies be processed again",
        ));
    }

    if !config.audit.enabled {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "file-ref",
            "audit.enabled",
            "audit logging is disabled",
        ));
    }
    if let Some(dir) = &config.bridge.working_dir
        && !dir.is_dir()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "file-ref",
            "bridge.working_dir",
            format!("{} is not a directory", dir.display()),
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn paths(result: &ValidationResult, category: &str) -> Vec<String> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.category == category)
            .map(|d| d.path.clone())
            .collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("timeout", "timeuot"), 2);
        assert_eq!(levenshtein("é", "e"), 1);
    }

    #[test]
    fn empty_config_is_valid() {
        let result = validate_toml_str("");
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_top_level_key_with_suggestion() {
        let result = validate_toml_str("[brige]\ntimeout_secs = 5\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(d.path, "brige");
        assert!(d.message.contains("\"bridge\""));
        assert!(result.has_errors());
    }

    #[test]
    fn unknown_nested_key() {
        let result = validate_toml_str("[reply]\nmax_len = 10\n");
        assert_eq!(paths(&result, "unknown-field"), vec!["reply.max_len"]);
    }

    #[test]
    fn env_table_accepts_any_key() {
        let result = validate_toml_str("[bridge.env]\nCUSTOM_TOKEN = \"x\"\n");
        assert!(paths(&result, "unknown-field").is_empty());
    }

    #[test]
    fn type_error_reported() {
        let result = validate_toml_str("[reply]\nmax_length = \"long\"\n");
        assert_eq!(result.count(Severity::Error), 1);
        assert_eq!(result.diagnostics[0].category, "type-error");
    }

    #[test]
    fn syntax_error_reported() {
        let result = validate_toml_str("[auth\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn zero_limits_are_errors() {
        let result = validate_toml_str(
            "[bridge]\ntimeout_secs = 0\n[reply]\nmax_length = 0\n[dedup]\ncapacity = 0\n",
        );
        let mut limits = paths(&result, "limits");
        limits.sort();
        assert_eq!(
            limits,
            vec!["bridge.timeout_secs", "dedup.capacity", "reply.max_length"]
        );
    }

    #[test]
    fn sender_without_group_warned() {
        let result = validate_toml_str("[auth]\nsender_id = \"123\"\n");
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(paths(&result, "auth"), vec!["auth.sender_id"]);
    }

    #[test]
    fn validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.yaml");
        std::fs::write(&path, "sidecar:\n  ack_timout_secs: 3\n").unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        let d = &result.diagnostics[0];
        assert_eq!(d.path, "sidecar.ack_timout_secs");
        assert!(d.message.contains("ack_timeout_secs"));
    }

    #[test]
    fn unreadable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate(Some(&dir.path().join("relay.toml")));
        assert!(result.has_errors());
    }
}
