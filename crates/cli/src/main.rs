//! `qpadm` -- command-line client for the qpAdm analysis service.
//!
//! Submits admixture models, follows their progress and lists history,
//! quota and the population catalogue. All requests share one dispatcher,
//! so concurrent reads stay within the service's rate limits.
//!
//! # Environment variables
//!
//! See [`ClientConfig::from_env`]; a `.env` file in the working directory
//! is loaded first. Log verbosity follows `RUST_LOG` (default
//! `qpadm_cli=info,qpadm_client=info`).

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use qpadm_cli::render;
use qpadm_client::api::HttpBackend;
use qpadm_client::config::ClientConfig;
use qpadm_client::dispatcher::RequestDispatcher;
use qpadm_client::lifecycle::RunController;
use qpadm_client::poller::PollController;
use qpadm_client::token::StaticToken;
use qpadm_core::analysis::AnalysisRequest;
use qpadm_core::command::parse_command;
use qpadm_core::population::DatasetType;
use qpadm_core::run::has_active_runs;
use qpadm_core::types::DbId;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// qpAdm admixture modelling client.
#[derive(Parser)]
#[command(name = "qpadm", version, about = "qpAdm admixture modelling client")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a run described by a key=value command file
    Submit {
        /// Path to the command file (geno, target, left, right)
        file: PathBuf,
        /// Follow the run until it completes or fails
        #[arg(long)]
        wait: bool,
    },

    /// Show a single run
    Run {
        /// Run id
        id: DbId,
    },

    /// List all runs
    History,

    /// Show today's run quota
    Usage,

    /// List the populations available in a dataset panel
    Populations {
        /// Dataset panel (1240k or HO)
        #[arg(long, default_value = "1240k")]
        dataset: DatasetType,
    },

    /// Poll the history until every run has finished
    Watch,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qpadm_cli=info,qpadm_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    tracing::debug!(
        api_url = %config.api_url,
        max_concurrent = config.dispatcher.max_concurrent,
        "Loaded client configuration",
    );

    let backend = HttpBackend::new(
        config.api_url.clone(),
        config.request_timeout,
        Arc::new(StaticToken::new(config.api_token.clone())),
    )
    .context("Failed to build HTTP client")?;
    let controller = RunController::new(
        Arc::new(backend),
        RequestDispatcher::new(config.dispatcher.clone()),
        config.retry.clone(),
    );
    let output = cli.output;

    match cli.command {
        Commands::Submit { file, wait } => {
            let request = load_request(&file).await?;
            let usage = controller.ensure_can_run().await?;
            tracing::info!(remaining = usage.runs_remaining_today, "Quota available");

            let run = controller.submit(&request).await?;
            emit(output, &run, render::run_details)?;

            if wait {
                let finished = controller
                    .wait_for_completion(run.id, config.poll_interval)
                    .await?;
                emit(output, &finished, render::run_details)?;
            }
        }
        Commands::Run { id } => {
            let run = controller.fetch_run(id).await?;
            emit(output, &run, render::run_details)?;
        }
        Commands::History => {
            let refresh = controller.refresh_history().await?;
            if let Some(message) = &refresh.format_error {
                tracing::warn!(%message, "History response had an unexpected shape");
            }
            emit(output, &refresh.runs, |runs| render::history(runs))?;
        }
        Commands::Usage => {
            let status = controller.usage().await?;
            emit(output, &status, render::usage)?;
        }
        Commands::Populations { dataset } => {
            let catalog = controller.catalog(dataset).await?;
            emit(output, &catalog, |c| render::catalog(c, dataset))?;
        }
        Commands::Watch => {
            let runs = controller.refresh_history().await?.runs;
            if !has_active_runs(&runs) {
                emit(output, &runs, |runs| render::history(runs))?;
                return Ok(());
            }

            let handle = PollController::start(controller, runs, config.poll_interval);
            let mut events = handle.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            emit(output, &event, render::event)?;
                            if !has_active_runs(&handle.latest()) {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Dropped run events");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            let runs = handle.latest();
            handle.stop().await;
            emit(output, &runs, |runs| render::history(runs))?;
        }
    }
    Ok(())
}

/// Read and parse a command file into a request.
async fn load_request(path: &Path) -> anyhow::Result<AnalysisRequest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let command = parse_command(&text).with_context(|| format!("In {}", path.display()))?;
    Ok(command.into_request())
}

/// Print `value` as pretty JSON or through its text renderer.
fn emit<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => {
            let rendered = text(value);
            print!("{rendered}");
            if !rendered.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
