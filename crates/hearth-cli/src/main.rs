// ABOUTME: hearth CLI entry point.
// ABOUTME: Provides init, services, up, console and players subcommands.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hearth_core::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Supervise compose-managed game servers from the terminal")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults to ~/.config/hearth/config.toml)
    #[arg(long, global = true, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging, including compose stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// List configured services
    Services,

    /// Start a service and relay its console output until Ctrl-C
    Up {
        /// Service name from the config
        service: String,

        /// Run `compose stop` when detaching
        #[arg(long)]
        stop_on_exit: bool,
    },

    /// Start a service and send console commands read from stdin
    Console {
        /// Service name from the config
        service: String,

        /// Milliseconds to wait for each response (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Start a game service and print who is connected
    Players {
        /// Service name from the config
        service: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if cli.verbose {
        hearth_log::init_verbose();
    } else {
        hearth_log::init();
    }

    match cli.command {
        Commands::Init => {
            let path = Config::init()?;
            println!("Config written to {}", path.display());
            Ok(())
        }
        command => {
            let config = match &cli.config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            dispatch(command, &config).await
        }
    }
}

async fn dispatch(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Services => commands::list_services(config),
        Commands::Up {
            service,
            stop_on_exit,
        } => commands::up(config, &service, stop_on_exit).await,
        Commands::Console {
            service,
            timeout_ms,
        } => commands::console(config, &service, timeout_ms).await,
        Commands::Players { service } => commands::players(config, &service).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_up_with_stop_flag() {
        let cli = Cli::try_parse_from(["hearth", "up", "mc", "--stop-on-exit"]).unwrap();
        match cli.command {
            Commands::Up {
                service,
                stop_on_exit,
            } => {
                assert_eq!(service, "mc");
                assert!(stop_on_exit);
            }
            _ => panic!("expected up"),
        }
    }

    #[test]
    fn parses_console_timeout() {
        let cli =
            Cli::try_parse_from(["hearth", "-v", "console", "mc", "--timeout-ms", "500"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Console {
                timeout_ms: Some(500),
                ..
            }
        ));
    }

    #[test]
    fn service_name_is_required() {
        assert!(Cli::try_parse_from(["hearth", "players"]).is_err());
    }
}
