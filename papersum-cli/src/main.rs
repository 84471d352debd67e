//! papersum CLI: summarize pending papers into layered plain-language summaries.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// papersum: rate-limited, resumable multi-level summaries of research papers
#[derive(Parser, Debug)]
#[command(name = "papersum", version, about, long_about = None)]
struct Cli {
    /// LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Write a default workspace config and create the store
    Init,
    /// Summarize pending papers
    Summarize {
        /// Papers per batch (overrides runner.batch_size)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Keep running paced batches until no pending work remains
        #[arg(long)]
        continuous: bool,
        /// Stop after this many batches in continuous mode
        #[arg(long)]
        max_batches: Option<usize>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show pending, completed and failed counts
    Status {
        /// Print counts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear failed records so those papers are retried
    RetryFailed,
    /// Print the effective configuration
    Config,
}

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub config: Option<PathBuf>,
    pub model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over the verbosity flags when set.
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let log_dir = directories::ProjectDirs::from("dev", "papersum", "papersum")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "papersum.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let overrides = Overrides {
        config: cli.config,
        model: cli.model,
    };
    commands::handle_command(cli.command, &workspace, &overrides).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_summarize_flags() {
        let cli = Cli::try_parse_from([
            "papersum",
            "summarize",
            "--limit",
            "3",
            "--continuous",
            "--max-batches",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Summarize {
                limit,
                continuous,
                max_batches,
                json,
            } => {
                assert_eq!(limit, Some(3));
                assert!(continuous);
                assert_eq!(max_batches, Some(7));
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "papersum",
            "status",
            "-vv",
            "--model",
            "gemini-2.5-pro",
            "--workspace",
            "/tmp/ws",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(cli.workspace, PathBuf::from("/tmp/ws"));
        assert!(matches!(cli.command, Commands::Status { json: false }));
    }

    #[test]
    fn test_retry_failed_is_kebab_case() {
        let cli = Cli::try_parse_from(["papersum", "retry-failed"]).unwrap();
        assert!(matches!(cli.command, Commands::RetryFailed));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["papersum"]).is_err());
    }
}
