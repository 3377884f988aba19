//! `claude-relay doctor`: config validation and environment audit.
//!
//! Runs a series of checks against the local installation and prints a
//! structured report with `[ok]`, `[warn]`, `[fail]`, `[skip]`, or `[info]`
//! status indicators per item.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    anyhow::Result,
    relay_channels::AuthPolicy,
    relay_config::{
        RelayConfig,
        validate::{self, Severity},
    },
    secrecy::ExposeSecret,
    tokio::process::Command,
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Per-check result used to build the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Skip,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Skip => DIM,
            Self::Info => CYAN,
        }
    }

    fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

/// Keys the worker needs for API-backed commands. (env var, what needs it)
const WORKER_KEYS: &[(&str, &str)] = &[
    ("ANTHROPIC_API_KEY", "/ask"),
    ("OPENAI_API_KEY", "voice transcription"),
];

/// Upper bound on `--version` checks.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ── Entry point ─────────────────────────────────────────────────────────────

pub async fn handle_doctor(config: &RelayConfig, explicit: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}claude-relay doctor{RESET}");
    eprintln!("{BOLD}==================={RESET}\n");

    let sections = vec![
        check_config_file(explicit),
        check_settings(config),
        check_authorization(config),
        check_worker(config).await,
        check_sidecar(config).await,
        check_directories(config),
    ];

    let (errors, warnings) = print_report(&sections);

    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

// ── 1. Config file ──────────────────────────────────────────────────────────

fn check_config_file(explicit: Option<&Path>) -> Section {
    let result = validate::validate(explicit);
    let label = result
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    let mut section = Section::new(format!("Config ({label})"));

    if result.config_path.is_none() {
        section.push(Status::Info, "No config file found; using defaults");
        return section;
    }

    let syntax: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "syntax")
        .collect();
    if !syntax.is_empty() {
        for d in syntax {
            section.push(Status::Fail, format!("Syntax: {}", d.message));
        }
        // Can't do further checks with broken syntax
        return section;
    }
    section.push(Status::Ok, "Syntax valid");

    let unknown_fields: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "unknown-field")
        .collect();
    if unknown_fields.is_empty() {
        section.push(Status::Ok, "All fields recognized");
    } else {
        for d in &unknown_fields {
            section.push(Status::Fail, format!("{}: {}", d.path, d.message));
        }
    }

    let type_errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "type-error")
        .collect();
    if type_errors.is_empty() {
        section.push(Status::Ok, "No type errors");
    } else {
        for d in &type_errors {
            section.push(Status::Fail, d.message.clone());
        }
    }

    section
}

// ── 2. Effective settings ───────────────────────────────────────────────────

/// Semantic checks on the config after environment overrides.
fn check_settings(config: &RelayConfig) -> Section {
    let mut section = Section::new("Settings");
    let mut diagnostics = Vec::new();
    validate::check_config(config, &mut diagnostics);

    if !diagnostics.iter().any(|d| d.severity != Severity::Info) {
        section.push(
            Status::Ok,
            format!(
                "Timeouts {}s / {}s, replies up to {} chars, dedup capacity {}",
                config.bridge.timeout_secs,
                config.bridge.transcribe_timeout_secs,
                config.reply.max_length,
                config.dedup.capacity,
            ),
        );
    }
    for d in &diagnostics {
        let msg = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        section.push(Status::from_severity(d.severity), msg);
    }
    section
}

// ── 3. Authorization ────────────────────────────────────────────────────────

fn check_authorization(config: &RelayConfig) -> Section {
    let mut section = Section::new("Authorization");
    let policy = AuthPolicy::from_ids(
        config.auth.group_id.as_deref(),
        config.auth.sender_id.as_deref(),
    );
    match &policy {
        AuthPolicy::SelfChat => {
            section.push(
                Status::Info,
                "Self-chat mode: only messages you send to your own chat are accepted",
            );
        },
        AuthPolicy::GroupSender {
            group_id,
            sender_id: Some(sender_id),
        } => {
            section.push(
                Status::Info,
                format!("Group mode: group {group_id}, sender {sender_id}"),
            );
        },
        AuthPolicy::GroupSender {
            group_id,
            sender_id: None,
        } => {
            section.push(
                Status::Info,
                format!("Group mode: group {group_id}, only your own messages"),
            );
        },
    }
    section
}

// ── 4. Worker ───────────────────────────────────────────────────────────────

async fn check_worker(config: &RelayConfig) -> Section {
    let bridge = &config.bridge;
    let mut section = Section::new("Worker");

    match resolve_program(&bridge.program, bridge.working_dir.as_deref()) {
        Some(path) => {
            let version = query_version(&path).await;
            section.push(
                Status::Ok,
                format!(
                    "{} found at {}{}",
                    bridge.program,
                    path.display(),
                    version.map(|v| format!(" ({v})")).unwrap_or_default()
                ),
            );
        },
        None => {
            section.push(Status::Fail, format!("{} not found", bridge.program));
        },
    }

    match script_arg(&bridge.args) {
        Some(script) => {
            let path = relative_to(bridge.working_dir.as_deref(), script);
            if path.is_file() {
                section.push(Status::Ok, format!("Worker script: {}", path.display()));
            } else {
                section.push(
                    Status::Fail,
                    format!("Worker script missing: {}", path.display()),
                );
            }
        },
        None => section.push(Status::Skip, "No worker script argument"),
    }

    for (key, needed_for) in WORKER_KEYS {
        let configured = bridge
            .env
            .get(*key)
            .is_some_and(|v| !v.expose_secret().trim().is_empty());
        if configured {
            section.push(Status::Ok, format!("{key} configured"));
        } else {
            section.push(
                Status::Warn,
                format!("{key} not set ({needed_for} will not work)"),
            );
        }
    }

    section
}

// ── 5. Sidecar ──────────────────────────────────────────────────────────────

async fn check_sidecar(config: &RelayConfig) -> Section {
    let sidecar = &config.sidecar;
    let mut section = Section::new("Chat sidecar");

    match which::which(&sidecar.program) {
        Ok(path) => {
            let version = query_version(&path).await;
            section.push(
                Status::Ok,
                format!(
                    "{} found at {}{}",
                    sidecar.program,
                    path.display(),
                    version.map(|v| format!(" ({v})")).unwrap_or_default()
                ),
            );
        },
        Err(_) => {
            section.push(Status::Fail, format!("{} not found", sidecar.program));
        },
    }

    let dir = match relay_whatsapp::find_sidecar_dir(sidecar.dir.as_deref()) {
        Ok(dir) => {
            section.push(Status::Ok, format!("Sidecar directory: {}", dir.display()));
            dir
        },
        Err(e) => {
            section.push(Status::Fail, e.to_string());
            return section;
        },
    };

    if let Some(entry) = script_arg(&sidecar.args) {
        if dir.join(entry).is_file() {
            section.push(Status::Ok, format!("{entry} built"));
        } else if which::which("npm").is_ok() {
            section.push(
                Status::Info,
                format!("{entry} missing (will be built on first start)"),
            );
        } else {
            section.push(
                Status::Fail,
                format!("{entry} missing and npm is not available to build it"),
            );
        }
    }

    match &sidecar.auth_dir {
        Some(auth_dir) if auth_dir.is_dir() => {
            section.push(Status::Ok, format!("Pairing data: {}", auth_dir.display()));
        },
        Some(auth_dir) => {
            section.push(
                Status::Info,
                format!(
                    "No pairing data at {} (a pairing code will be shown on start)",
                    auth_dir.display()
                ),
            );
        },
        None => {},
    }

    section
}

// ── 6. Directories ──────────────────────────────────────────────────────────

fn check_directories(config: &RelayConfig) -> Section {
    let mut section = Section::new("Directories");

    match relay_config::config_dir() {
        Some(dir) if dir.is_dir() => {
            section.push(Status::Ok, format!("Config directory: {}", dir.display()));
        },
        Some(dir) => {
            section.push(
                Status::Info,
                format!("Config directory not created: {}", dir.display()),
            );
        },
        None => {
            section.push(Status::Warn, "Unable to resolve config directory");
        },
    }

    if !config.audit.enabled {
        section.push(Status::Skip, "Audit log disabled");
        return section;
    }

    let audit_path = config.audit.resolved_path();
    section.push(Status::Info, format!("Audit log: {}", audit_path.display()));
    match nearest_existing_dir(&audit_path) {
        Some(dir) => check_writable(&mut section, &dir, "Audit log directory"),
        None => section.push(Status::Fail, "Audit log directory cannot be created"),
    }

    section
}

fn check_writable(section: &mut Section, dir: &Path, label: &str) {
    let marker = dir.join(".claude-relay-doctor-write-test");
    match std::fs::write(&marker, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            section.push(Status::Ok, format!("{label} is writable: {}", dir.display()));
        },
        Err(e) => {
            section.push(Status::Fail, format!("{label} is not writable: {e}"));
        },
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// First argument that is not a flag, taken to be the script being run.
fn script_arg(args: &[String]) -> Option<&str> {
    args.iter().map(String::as_str).find(|a| !a.starts_with('-'))
}

fn relative_to(base: Option<&Path>, path: &str) -> PathBuf {
    match base {
        Some(base) => base.join(path),
        None => PathBuf::from(path),
    }
}

/// Locate an executable by name on `PATH`, or relative to the working
/// directory when given as a path.
fn resolve_program(program: &str, working_dir: Option<&Path>) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = relative_to(working_dir, program);
        return path.is_file().then_some(path);
    }
    which::which(program).ok()
}

/// Closest existing ancestor of the file's parent directory.
fn nearest_existing_dir(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .find(|p| p.is_dir())
        .map(Path::to_path_buf)
}

async fn query_version(program: &Path) -> Option<String> {
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new(program).arg("--version").kill_on_drop(true).output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}
