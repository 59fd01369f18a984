//! `batchvision` -- submit a batch of images for remote processing.
//!
//! Reads the given image files, uploads them to the processing service,
//! reports estimated progress on stderr while the batch runs, and writes
//! the final result as JSON to stdout or `--output`.
//!
//! # Exit codes
//!
//! | Code  | Meaning                                                        |
//! |-------|----------------------------------------------------------------|
//! | `0`   | Real results were fetched                                      |
//! | `1`   | The batch could not be submitted, or failed without a fallback |
//! | `2`   | Processing failed and a synthetic result was written           |
//! | `130` | Interrupted with Ctrl-C                                        |
//!
//! # Environment variables
//!
//! | Variable               | Default                 | Description                  |
//! |------------------------|-------------------------|------------------------------|
//! | `BATCHVISION_API_URL`  | `http://127.0.0.1:8000` | Processing service location  |
//! | `POLL_INTERVAL_MS`     | `1000`                  | Status poll period           |
//! | `PROGRESS_INTERVAL_MS` | `800`                   | Progress estimate period     |
//! | `HEALTH_INTERVAL_SECS` | `30`                    | Liveness check period        |
//! | `MAX_POLL_ATTEMPTS`    | unbounded               | Give up after this many polls |
//! | `REQUEST_TIMEOUT_SECS` | none                    | Per-request HTTP timeout     |
//! | `LOG_FORMAT`           | text                    | `json` for JSON log lines    |

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use batchvision_client::api::{ApiClient, ApiError, BatchTransport};
use batchvision_client::config::{ClientConfig, ConfigError};
use batchvision_client::events::BatchEvent;
use batchvision_client::health::{Connectivity, HealthProbe};
use batchvision_client::orchestrator::{BatchOrchestrator, OrchestratorConfig};
use batchvision_core::job::InputFile;
use batchvision_core::options::{EnhanceMode, Mode, NoiseMode, ProcessOptions, SegmentMode};
use batchvision_core::result::BatchResult;
use batchvision_core::types::JobId;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_FAILED: u8 = 1;
const EXIT_FALLBACK: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "batchvision", version, about = "Submit images for batch processing")]
struct Cli {
    /// Image files to process.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// `auto` lets the service pick every stage; `advanced` sends the
    /// per-stage selections below.
    #[arg(long, default_value_t = Mode::Auto)]
    mode: Mode,

    #[arg(long, default_value_t = NoiseMode::Auto)]
    noise: NoiseMode,

    #[arg(long, default_value_t = EnhanceMode::Auto)]
    enhance: EnhanceMode,

    #[arg(long, default_value_t = SegmentMode::Auto)]
    segment: SegmentMode,

    /// Base location of the processing service.
    #[arg(long, env = "BATCHVISION_API_URL")]
    api_url: Option<String>,

    /// Write the result JSON here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> ProcessOptions {
        match self.mode {
            Mode::Advanced => ProcessOptions::advanced(self.noise, self.enhance, self.segment),
            Mode::Auto => {
                let custom = self.noise != NoiseMode::Auto
                    || self.enhance != EnhanceMode::Auto
                    || self.segment != SegmentMode::Auto;
                if custom {
                    tracing::warn!("Per-stage options are ignored unless --mode advanced is set");
                }
                ProcessOptions::default()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "batchvision failed");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "batchvision_cli=info,batchvision_client=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    let options = cli.options();
    let files = read_images(&cli.images).await?;

    tracing::info!(
        api_url = %config.api_url,
        files = files.len(),
        mode = %options.mode,
        "Starting batchvision",
    );

    let transport: Arc<dyn BatchTransport> = Arc::new(ApiClient::from_config(&config)?);

    let cancel = CancellationToken::new();
    let probe = HealthProbe::new(Arc::clone(&transport), config.health_interval);
    if probe.check().await != Connectivity::Connected {
        tracing::warn!(api_url = %config.api_url, "Service is not reachable, submitting anyway");
    }
    let mut health = probe.watch();
    probe.spawn(cancel.clone());

    let orchestrator = BatchOrchestrator::new(transport, OrchestratorConfig::from(&config));
    let mut events = orchestrator.subscribe();

    let code = match orchestrator.submit(files, options).await {
        Ok(job_id) => {
            tracing::info!(job_id = %job_id, "Batch submitted");
            follow(&orchestrator, job_id, &mut events, &mut health, cli.output.as_deref()).await?
        }
        Err(e) => {
            tracing::error!(error = %e, "Batch submission failed");
            ExitCode::from(EXIT_FAILED)
        }
    };

    cancel.cancel();
    orchestrator.shutdown().await;
    Ok(code)
}

/// Render events until the job reaches a terminal outcome.
async fn follow(
    orchestrator: &BatchOrchestrator,
    job_id: JobId,
    events: &mut tokio::sync::broadcast::Receiver<BatchEvent>,
    health: &mut tokio::sync::watch::Receiver<Connectivity>,
    output: Option<&Path>,
) -> Result<ExitCode, CliError> {
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                tracing::warn!("Interrupted, discarding job");
                orchestrator.reset().await;
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            Ok(()) = health.changed() => {
                let connectivity = *health.borrow_and_update();
                if connectivity == Connectivity::Disconnected {
                    tracing::warn!("Lost connection to the processing service");
                }
            }
            event = events.recv() => match event {
                Ok(event) if event.job_id().is_some_and(|id| id != job_id) => {}
                Ok(BatchEvent::Progress { processed, total, .. }) => {
                    eprintln!("Processed {processed}/{total}");
                }
                Ok(BatchEvent::StateChanged { state, .. }) => {
                    tracing::debug!(state = state.label(), "Job state changed");
                }
                Ok(BatchEvent::Completed { result, .. }) => {
                    write_result(&result, output).await?;
                    return Ok(ExitCode::SUCCESS);
                }
                Ok(BatchEvent::FallbackCompleted { result, error, .. }) => {
                    tracing::warn!(error = %error, "Processing failed, writing synthetic result");
                    write_result(&result, output).await?;
                    return Ok(ExitCode::from(EXIT_FALLBACK));
                }
                Ok(BatchEvent::Failed { error, .. }) => {
                    tracing::error!(error = %error, "Batch failed");
                    return Ok(ExitCode::from(EXIT_FAILED));
                }
                Ok(BatchEvent::Cancelled { .. } | BatchEvent::Reset) => {
                    return Ok(ExitCode::from(EXIT_INTERRUPTED));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged");
                }
                Err(RecvError::Closed) => {
                    return Ok(ExitCode::from(EXIT_FAILED));
                }
            },
        }
    }
}

async fn read_images(paths: &[PathBuf]) -> Result<Vec<InputFile>, CliError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await.map_err(|source| CliError::Read {
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(InputFile::new(name, bytes));
    }
    Ok(files)
}

async fn write_result(result: &BatchResult, output: Option<&Path>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .map_err(|source| CliError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing::info!(path = %path.display(), items = result.len(), "Result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
