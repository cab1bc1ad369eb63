//! Summarizer: HTTP summarization and translation over a pluggable
//! inference backend.

mod logging;
mod startup;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use summarizer_core::config::{ServiceConfig, load_config};
use summarizer_core::BackendKind;

/// Summarization and translation gateway
#[derive(Parser, Debug)]
#[command(name = "summarizer", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./summarizer.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend kind: local_model, serverless_gpu, hosted_api
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the effective configuration as TOML and exit
    CheckConfig,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ServiceConfig) {
        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Configuration error")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Configuration error")?;

    if let Some(Commands::CheckConfig) = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let _guard = logging::init(&config.logging, cli.verbose, cli.quiet)?;
    startup::run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["summarizer"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.backend.is_none());
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from(["summarizer", "--backend", "local_model", "--port", "9001", "-vv"])
            .unwrap();
        let mut config = ServiceConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.backend.kind, BackendKind::LocalModel);
        assert_eq!(config.server.port, 9001);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["summarizer", "--backend", "mainframe"]).is_err());
    }

    #[test]
    fn test_check_config_subcommand() {
        let cli = Cli::try_parse_from(["summarizer", "check-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }

    #[test]
    fn test_effective_config_redacts_token() {
        let mut config = ServiceConfig::default();
        config.backend.hosted.api_token = Some(summarizer_core::config::ApiToken::new("hf_secret"));
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("hf_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
