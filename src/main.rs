use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dermascan::capture::{CameraFeed, CaptureSource, FileCapture};
use dermascan::{HttpScanClient, PollConfig, ScanError, ScanOrchestrator, StaticCredentials};

/// Runs a skin scan against a remote analysis service.
#[derive(Debug, Parser)]
#[command(name = "dermascan", version, about)]
struct Cli {
    /// Image file to scan (JPEG or PNG)
    image: PathBuf,

    /// Base URL of the scan service
    #[arg(long, env = "DERMASCAN_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Bearer token for authenticated requests
    #[arg(long, env = "DERMASCAN_API_TOKEN")]
    token: Option<String>,

    /// Delay between status queries, in milliseconds
    #[arg(long, default_value_t = 1500)]
    interval_ms: u64,

    /// Give up polling after this many milliseconds
    #[arg(long, default_value_t = 120_000)]
    timeout_ms: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("dermascan={}", default_level))),
        )
        .init();

    let mut feed = CameraFeed::acquire(FileCapture::new(&cli.image))
        .context("capture source unavailable")?;
    let frame = feed
        .capture()
        .with_context(|| format!("failed to read {}", cli.image.display()))?;
    feed.release();

    let backend = HttpScanClient::new(
        cli.api_url.clone(),
        Box::new(StaticCredentials::new(cli.token.clone())),
    );
    let orchestrator = ScanOrchestrator::new(
        Arc::new(backend),
        PollConfig {
            interval: Duration::from_millis(cli.interval_ms),
            timeout: Duration::from_millis(cli.timeout_ms),
        },
    );

    let session_id = orchestrator
        .initialize()
        .await
        .context("could not start a scan session")?;
    println!("Session {}", session_id);

    let outcome = tokio::select! {
        outcome = orchestrator.submit(frame) => outcome,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.reset();
            bail!("interrupted, scan abandoned");
        }
    };

    if let Some(report) = orchestrator.quality_report() {
        if let Some(warning) = &report.warning {
            println!("Warning: {}", warning);
        }
    }

    match outcome {
        Ok(()) => {}
        Err(err @ ScanError::QualityRejected { .. }) => {
            println!("{}", err.user_message());
            println!("For a usable capture:");
            for guideline in dermascan::quality::quality_guidelines() {
                println!("  - {}", guideline);
            }
            bail!("capture rejected, try again with a different photo");
        }
        Err(err) => {
            bail!("{}", err.user_message());
        }
    }

    let result = orchestrator.result()?;
    println!("Scan complete.");
    if !result.scores.is_empty() {
        println!("Scores:");
        for (concern, severity) in &result.scores {
            println!("  {:<16} {:>5.1}", concern, severity);
        }
    }
    if !result.recommendations.is_empty() {
        println!("Recommendations:");
        for recommendation in &result.recommendations {
            println!("  - {}", recommendation);
        }
    }
    if let Some(generated_at) = result.generated_at {
        println!("Generated at {}", generated_at.to_rfc3339());
    }

    Ok(())
}
