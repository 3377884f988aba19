use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use relay_config::{
    RelayConfig,
    validate::{self, Severity},
};

#[derive(Subcommand, Default)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets redacted (default).
    #[default]
    Show,
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the path of the config file in use.
    Path,
}

pub fn handle_config(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = crate::load_config(explicit)?;
            println!("{}", render(&config)?);
            Ok(())
        },
        ConfigAction::Check { verbose } => check(explicit, verbose),
        ConfigAction::Path => {
            match explicit
                .map(Path::to_path_buf)
                .or_else(relay_config::find_config_file)
            {
                Some(path) => println!("{}", path.display()),
                None => {
                    eprintln!("No config file found; using defaults.");
                    if let Ok(path) = relay_config::default_config_path() {
                        eprintln!("Create one at {}", path.display());
                    }
                },
            }
            Ok(())
        },
    }
}

fn render(config: &RelayConfig) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(explicit);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
