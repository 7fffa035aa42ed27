//! Run one task against a WBChannel endpoint and print its progress.
//!
//! ```text
//! cargo run --example run_task -- --invoker-id 306177 --session-token <token> --count 10
//! RUST_LOG=wbchannel_client=debug cargo run --example run_task -- --config channel.json ...
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use wbchannel_client::api::StartTaskResponse;
use wbchannel_client::{Orchestrator, OrchestratorBuilder};

#[derive(Parser, Debug)]
#[command(about = "Drive one WBChannel task to completion")]
struct Args {
    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// WebSocket endpoint.
    #[arg(long)]
    endpoint: Option<String>,
    /// Invoker (user) id.
    #[arg(long)]
    invoker_id: Option<String>,
    /// Session token obtained from login.
    #[arg(long)]
    session_token: String,
    /// Number of business units to send.
    #[arg(long, default_value_t = 10)]
    count: u32,
    /// Seconds between status lines.
    #[arg(long, default_value_t = 1)]
    status_every: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wbchannel_client=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut builder = match &args.config {
        Some(path) => OrchestratorBuilder::from_file(path)?,
        None => Orchestrator::builder(),
    };
    if let Some(endpoint) = args.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(invoker_id) = args.invoker_id {
        builder = builder.invoker_id(invoker_id);
    }
    let orchestrator = builder.build()?;

    let started = orchestrator.start_task(args.count, &args.session_token).await;
    println!("{}", serde_json::to_string(&StartTaskResponse::from(&started))?);
    let ticket = started?;

    let mut ticks = tokio::time::interval(Duration::from_secs(args.status_every.max(1)));
    let done = ticket.wait();
    tokio::pin!(done);

    let report = loop {
        tokio::select! {
            report = &mut done => break report,
            _ = ticks.tick() => {
                println!("{}", serde_json::to_string(&orchestrator.task_status())?);
            }
        }
    };

    println!("{}", serde_json::to_string(&orchestrator.task_status())?);
    if let Some(error) = report.and_then(|r| r.error) {
        eprintln!("task stopped early: {error}");
    }

    println!("{}", serde_json::to_string(&orchestrator.logout().await)?);
    Ok(())
}
