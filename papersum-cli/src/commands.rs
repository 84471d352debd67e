//! CLI subcommand handlers.

use crate::{Commands, Overrides};
use papersum_core::ports::{DocumentSource, SummarySink, WorkSource};
use papersum_core::{
    BatchRunner, PipelineConfig, RateLimiter, ResponseSynthesizer, RunReport, create_provider,
};
use papersum_tools::{PdfTextSource, SqliteStore, StoreStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    overrides: &Overrides,
) -> anyhow::Result<()> {
    match command {
        Commands::Init => handle_init(workspace, overrides).await,
        Commands::Summarize {
            limit,
            continuous,
            max_batches,
            json,
        } => {
            let config = load(workspace, overrides)?;
            let report = summarize(config, workspace, limit, continuous, max_batches).await?;
            print_report(&report, json)
        }
        Commands::Status { json } => {
            let config = load(workspace, overrides)?;
            let store = SqliteStore::open(store_path(&config, workspace)).await?;
            print_status(&store.status().await?, json)
        }
        Commands::RetryFailed => {
            let config = load(workspace, overrides)?;
            let store = SqliteStore::open(store_path(&config, workspace)).await?;
            let cleared = store.reset_failed().await?;
            println!("Cleared {} failed record(s); they are pending again.", cleared);
            Ok(())
        }
        Commands::Config => {
            let config = load(workspace, overrides)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load(workspace: &Path, overrides: &Overrides) -> anyhow::Result<PipelineConfig> {
    let mut config = papersum_core::load_config(Some(workspace), overrides.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(model) = &overrides.model {
        config.llm.model = model.clone();
    }
    Ok(config)
}

/// Relative store paths resolve against the workspace.
fn store_path(config: &PipelineConfig, workspace: &Path) -> PathBuf {
    if config.store.path.is_absolute() {
        config.store.path.clone()
    } else {
        workspace.join(&config.store.path)
    }
}

async fn handle_init(workspace: &Path, overrides: &Overrides) -> anyhow::Result<()> {
    let config_dir = workspace.join(".papersum");
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
    } else {
        let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
        std::fs::write(&config_path, &toml_str)?;
        println!(
            "Created default configuration at: {}",
            config_path.display()
        );
    }

    let config = load(workspace, overrides)?;
    let store = SqliteStore::open(store_path(&config, workspace)).await?;
    println!("Store ready at: {}", store.path().display());
    Ok(())
}

async fn summarize(
    config: PipelineConfig,
    workspace: &Path,
    limit: Option<usize>,
    continuous: bool,
    max_batches: Option<usize>,
) -> anyhow::Result<RunReport> {
    let mut runner_config = config.runner.clone();
    if let Some(limit) = limit {
        runner_config.batch_size = limit;
    }
    if max_batches.is_some() {
        runner_config.max_batches = max_batches;
    }
    if runner_config.batch_size == 0 {
        anyhow::bail!("Batch size must be at least 1");
    }

    let store = Arc::new(SqliteStore::open(store_path(&config, workspace)).await?);
    let work: Arc<dyn WorkSource> = store.clone();
    let sink: Arc<dyn SummarySink> = store;
    let documents: Arc<dyn DocumentSource> = Arc::new(PdfTextSource::new(&config.document)?);

    let provider = create_provider(&config.llm)?;
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.requests_per_minute));
    let synthesizer =
        ResponseSynthesizer::new(provider, limiter, config.synthesis.clone(), &config.llm);
    info!(
        model = synthesizer.model_name(),
        requests_per_minute = config.rate_limit.requests_per_minute,
        batch_size = runner_config.batch_size,
        continuous,
        "Starting summarization"
    );

    let mut runner = BatchRunner::new(synthesizer, work, documents, sink, runner_config);
    let token = runner.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current paper");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let report = runner.run(continuous).await;
    ctrl_c.abort();
    Ok(report)
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "Run {}: {} batch(es), {} summarized, {} failed, {} skipped",
        report.stop_reason, report.batches, report.successes, report.failures, report.skipped
    );
    Ok(())
}

fn print_status(status: &StoreStatus, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    println!("Papers:    {}", status.total);
    println!("Pending:   {}", status.pending);
    println!("Completed: {}", status.completed);
    println!("Failed:    {}", status.failed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_store() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        handle_command(Commands::Init, workspace, &Overrides::default())
            .await
            .unwrap();

        let config_path = workspace.join(".papersum").join("config.toml");
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: PipelineConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed, PipelineConfig::default());
        assert!(workspace.join("data").join("papers.sqlite").exists());
    }

    #[tokio::test]
    async fn test_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        let config_dir = workspace.join(".papersum");
        std::fs::create_dir_all(&config_dir).unwrap();
        let custom = "[runner]\nbatch_size = 9\n";
        std::fs::write(config_dir.join("config.toml"), custom).unwrap();

        handle_command(Commands::Init, workspace, &Overrides::default())
            .await
            .unwrap();

        let content = std::fs::read_to_string(config_dir.join("config.toml")).unwrap();
        assert_eq!(content, custom);
    }

    #[tokio::test]
    async fn test_status_and_retry_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        handle_command(
            Commands::Status { json: true },
            workspace,
            &Overrides::default(),
        )
        .await
        .unwrap();
        handle_command(Commands::RetryFailed, workspace, &Overrides::default())
            .await
            .unwrap();

        let store = SqliteStore::open(workspace.join("data").join("papers.sqlite"))
            .await
            .unwrap();
        assert_eq!(store.status().await.unwrap(), StoreStatus::default());
    }

    #[test]
    fn test_model_override_applies() {
        let dir = TempDir::new().unwrap();
        let overrides = Overrides {
            config: None,
            model: Some("gemini-2.5-pro".to_string()),
        };
        let config = load(dir.path(), &overrides).unwrap();
        assert_eq!(config.llm.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_store_path_resolution() {
        let workspace = Path::new("/srv/papers");
        let mut config = PipelineConfig::default();
        assert_eq!(
            store_path(&config, workspace),
            PathBuf::from("/srv/papers/data/papers.sqlite")
        );
        config.store.path = PathBuf::from("/var/lib/papersum.db");
        assert_eq!(
            store_path(&config, workspace),
            PathBuf::from("/var/lib/papersum.db")
        );
    }

    #[tokio::test]
    async fn test_summarize_rejects_zero_batch_size() {
        let dir = TempDir::new().unwrap();
        let result = summarize(
            PipelineConfig::default(),
            dir.path(),
            Some(0),
            false,
            None,
        )
        .await;
        assert!(result.is_err());
    }
}
