//! Analysis Indexer Main Entry Point
//!
//! Runs one indexing command against the configured repositories and
//! OpenSearch, then prints the per-index results as JSON.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use analysis_indexer::{Dependencies, Indexer, IndexerError};
use analysis_indexer_shared::{
    Analysis, AnalysisIdentifier, IndexAnalysisCommand, IndexAnalysisPayloadCommand,
    IndexRepositoryCommand, IndexResults, IndexStudyCommand, RemoveAnalysisCommand,
};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "analysis-indexer")]
#[command(about = "Index genomic analysis metadata from study repositories into OpenSearch")]
#[command(version)]
struct Cli {
    /// Abort the command after this many seconds. Writes already sent are kept.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch and index one analysis")]
    IndexAnalysis {
        #[arg(long)]
        analysis_id: String,
        #[arg(long)]
        study_id: String,
        #[arg(long)]
        repo_code: String,
    },
    #[command(about = "Index an analysis read from a JSON file")]
    IndexAnalysisPayload {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        repo_code: String,
    },
    #[command(about = "Index every analysis of a study")]
    IndexStudy {
        #[arg(long)]
        study_id: String,
        #[arg(long)]
        repo_code: String,
    },
    #[command(about = "Index every study of a repository")]
    IndexRepository {
        #[arg(long)]
        repo_code: String,
    },
    #[command(about = "Remove a repository's copy of an analysis from the indexes")]
    RemoveAnalysis {
        #[arg(long)]
        analysis_id: String,
        #[arg(long)]
        study_id: String,
        #[arg(long)]
        repo_code: String,
    },
}

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("analysis_indexer=info,analysis_indexer_repository=info")
    });

    let json_logs = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .pretty(),
            )
            .init();
    }

    info!(
        service_name = "analysis-indexer",
        service_version = env!("CARGO_PKG_VERSION"),
        json = json_logs,
        "Tracing initialized"
    );

    Ok(())
}

async fn run(indexer: &Indexer, command: Commands) -> Result<IndexResults, IndexerError> {
    match command {
        Commands::IndexAnalysis {
            analysis_id,
            study_id,
            repo_code,
        } => {
            indexer
                .index_analysis(&IndexAnalysisCommand {
                    analysis_identifier: AnalysisIdentifier::new(analysis_id, study_id, repo_code),
                })
                .await
        }
        Commands::IndexAnalysisPayload { file, repo_code } => {
            let raw = tokio::fs::read(&file).await.map_err(|e| {
                IndexerError::config(format!("Failed to read {}: {}", file.display(), e))
            })?;
            let analysis: Analysis = serde_json::from_slice(&raw)
                .map_err(|e| IndexerError::bad_data(format!("{}: {}", file.display(), e)))?;
            indexer
                .index_analysis_payload(&IndexAnalysisPayloadCommand {
                    analysis,
                    repository_code: repo_code,
                })
                .await
        }
        Commands::IndexStudy {
            study_id,
            repo_code,
        } => {
            indexer
                .index_study(&IndexStudyCommand {
                    study_id,
                    repository_code: repo_code,
                })
                .await
        }
        Commands::IndexRepository { repo_code } => {
            indexer
                .index_repository(&IndexRepositoryCommand {
                    repository_code: repo_code,
                })
                .await
        }
        Commands::RemoveAnalysis {
            analysis_id,
            study_id,
            repo_code,
        } => {
            indexer
                .remove_analysis(&RemoveAnalysisCommand {
                    analysis_identifier: AnalysisIdentifier::new(analysis_id, study_id, repo_code),
                })
                .await
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, IndexerError> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    init_tracing()?;

    let deps = match Dependencies::new().await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };
    let indexer = &deps.indexer;

    let deadline = cli.timeout_secs.map(Duration::from_secs);
    let results = indexer
        .with_deadline(deadline, run(indexer, cli.command))
        .await;

    let results = match results {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Command failed");
            return Err(e);
        }
    };

    let output = serde_json::to_string_pretty(&results)
        .map_err(|e| IndexerError::unhandled(format!("Failed to render results: {}", e)))?;
    println!("{}", output);

    if results.values().all(|r| r.successful) {
        info!("Command completed successfully");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Command completed with failures");
        Ok(ExitCode::FAILURE)
    }
}
