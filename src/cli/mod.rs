use clap::{Parser, Subcommand};

pub mod config;
pub mod run;
pub mod version;

#[derive(Parser)]
#[command(name = "wabridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "WhatsApp bridge for the messaging backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge service
    Run {
        /// Path to config file (default: platform data dir, e.g.
        /// ~/.local/share/wabridge/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Backend websocket URL, overriding config and environment
        #[arg(long)]
        server: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config, server } => run::execute(config, server).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from([
            "wabridge",
            "run",
            "--config",
            "/tmp/bridge.toml",
            "--server",
            "ws://localhost:1989",
        ]);

        match cli.command {
            Commands::Run { config, server } => {
                assert_eq!(config.as_deref(), Some("/tmp/bridge.toml"));
                assert_eq!(server.as_deref(), Some("ws://localhost:1989"));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::parse_from(["wabridge", "run"]);

        match cli.command {
            Commands::Run { config, server } => {
                assert!(config.is_none());
                assert!(server.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["wabridge", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
