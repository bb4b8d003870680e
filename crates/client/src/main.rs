// crates/client/src/main.rs
//! `scrape-hub` command line: start, watch and cancel scrape jobs.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scrape_hub_client::{
    CancelHandle, HttpJobApi, JobApi, JobEvent, PollConfig, PollingClient,
};
use scrape_hub_server_jobs::{JobSnapshot, JobStatus};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scrape-hub", version, about = "Start and follow scrape jobs on a scrape-hub server")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "SCRAPE_HUB_URL", default_value = "http://localhost:8000")]
    url: String,

    /// API secret sent as X-API-Key
    #[arg(long, env = "SCRAPE_HUB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a scrape (or attach to the running one) and follow it to the end
    Run {
        /// Source key, e.g. `seia` or `hechos_esenciales`
        source: String,

        /// Request cancellation after this many seconds
        #[arg(long, value_name = "SECS")]
        cancel_after: Option<u64>,

        /// Poll interval in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Print the current snapshot of a source's job
    Status { source: String },
    /// Ask the running job of a source to stop
    Cancel { source: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,scrape_hub=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = Arc::new(HttpJobApi::new(&cli.url, cli.api_key)?);

    match cli.command {
        Command::Run {
            source,
            cancel_after,
            interval_ms,
        } => {
            let config = PollConfig {
                interval: Duration::from_millis(interval_ms.max(50)),
                cancel_after: cancel_after.map(Duration::from_secs),
                ..Default::default()
            };
            run(api, &source, config).await
        }
        Command::Status { source } => {
            let snapshot = api
                .snapshot(&source, None)
                .await
                .with_context(|| format!("fetching status of {source}"))?;
            print_snapshot(&snapshot);
            Ok(ExitCode::SUCCESS)
        }
        Command::Cancel { source } => {
            let resp = api
                .request_cancel(&source)
                .await
                .with_context(|| format!("cancelling {source}"))?;
            if resp.acknowledged {
                println!("Cancel requested for {source}");
            } else {
                println!("No running job for {source}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(api: Arc<HttpJobApi>, source: &str, config: PollConfig) -> Result<ExitCode> {
    let cancel = CancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar().template("  {spinner} [{bar:40}] {pos:>3}% {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut client = PollingClient::new(api, config);
    let outcome = client
        .run(source, cancel, |event| match event {
            JobEvent::Started(snap) => {
                pb.set_message(format!("started execution {}", snap.execution_id.unwrap_or(0)));
            }
            JobEvent::Attached(snap) => {
                pb.set_position(u64::from(snap.percent));
                pb.set_message(format!("attached to running job: {}", snap.message));
            }
            JobEvent::Progress { percent, message } => {
                pb.set_position(u64::from(*percent));
                pb.set_message(message.clone());
            }
            JobEvent::CancelRequested { acknowledged } => {
                if *acknowledged {
                    pb.set_message("cancelling, waiting for the job to stop...");
                }
            }
            JobEvent::Completed { count, metrics } => {
                pb.finish_and_clear();
                let details: Vec<String> = metrics.iter().map(|(k, v)| format!("{k}={v}")).collect();
                eprintln!("  \u{2713} {source}: {count} leads ({})", details.join(", "));
            }
            JobEvent::Failed { error } => {
                pb.abandon();
                eprintln!("  \u{2717} {source} failed: {error}");
            }
            JobEvent::Cancelled { percent, .. } => {
                pb.abandon();
                eprintln!("  {source} cancelled at {percent}%");
            }
        })
        .await;

    let snapshot = match outcome {
        Ok(snapshot) => snapshot,
        Err(e) => {
            pb.abandon();
            return Err(e).context("following scrape job");
        }
    };
    Ok(match snapshot.state {
        JobStatus::Completed => ExitCode::SUCCESS,
        JobStatus::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}

fn print_snapshot(snapshot: &JobSnapshot) {
    println!("{}: {} {}%", snapshot.key, snapshot.state.as_str(), snapshot.percent);
    if !snapshot.message.is_empty() {
        println!("  {}", snapshot.message);
    }
    if let Some(result) = &snapshot.result {
        match serde_json::to_string(result) {
            Ok(json) => println!("  result: {json}"),
            Err(e) => tracing::warn!(error = %e, "Failed to render result"),
        }
    }
}
