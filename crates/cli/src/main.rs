mod config_commands;
mod doctor_commands;
mod run_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    relay_config::RelayConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "claude-relay",
    version,
    about = "Drive Claude Code from your own chat account"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of searching `./` and the user config dir.
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (default when no subcommand is provided).
    Run,
    /// Show or check the configuration.
    Config {
        #[command(subcommand)]
        action: Option<config_commands::ConfigAction>,
    },
    /// Check the local installation and configuration.
    Doctor,
    /// Show how a chat message would be interpreted.
    Parse {
        /// Message text. Multiple words are joined with spaces.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the effective configuration: file, then environment overrides.
///
/// An explicitly named file must load; a discovered one falls back to
/// defaults with a warning.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let mut config = match explicit {
        Some(path) => relay_config::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => relay_config::discover_and_load(),
    };
    relay_config::apply_env_overrides(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => {
            let config = load_config(cli.config.as_deref())?;
            info!(version = env!("CARGO_PKG_VERSION"), "claude-relay starting");
            run_commands::run(config).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action.unwrap_or_default(), cli.config.as_deref())
        },
        Some(Commands::Doctor) => {
            let config = load_config(cli.config.as_deref())?;
            doctor_commands::handle_doctor(&config, cli.config.as_deref()).await
        },
        Some(Commands::Parse { text }) => handle_parse(&text.join(" ")),
    }
}

fn handle_parse(text: &str) -> anyhow::Result<()> {
    let command = relay_auto_reply::parse(text);
    println!("Command:  {}", command.name());
    if let Some(argument) = command.argument() {
        println!("Argument: {argument}");
    }
    match command.bridge_request() {
        Some(request) => println!("Worker:   {}", serde_json::to_string(&request)?),
        None => println!("Worker:   (answered locally)"),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["claude-relay"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn parse_joins_words() {
        let cli = Cli::try_parse_from(["claude-relay", "parse", "/ask", "what", "now?"]).unwrap();
        let Some(Commands::Parse { text }) = cli.command else {
            panic!("expected parse");
        };
        assert_eq!(text.join(" "), "/ask what now?");
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "claude-relay",
            "doctor",
            "--json-logs",
            "--config",
            "/tmp/relay.toml",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Doctor)));
        assert!(cli.json_logs);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/relay.toml")));
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[reply]\nmax_length = 1200\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.reply.max_length, 1200);
    }
}
