use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use defi_event_recorder::config::{self, Environment};
use defi_event_recorder::historical::{self, BackfillRequest};
use defi_event_recorder::shutdown::Shutdown;
use defi_event_recorder::{live, monitoring};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// Address the `/health` and `/metrics` endpoints are served on.
    #[clap(long, env, default_value = "0.0.0.0:9091")]
    monitoring_address: SocketAddr,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the live WebSocket recording pipeline.
    Live {
        #[clap(long, env)]
        config: PathBuf,
    },
    /// Run a single historical backfill job.
    Historical {
        #[clap(long, env)]
        config: PathBuf,
        #[clap(long)]
        event_id: String,
        #[clap(long)]
        contract_address: String,
        #[clap(long)]
        from_block: i64,
        #[clap(long)]
        to_block: i64,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let shutdown = Shutdown::spawn(Duration::from_secs(30), Duration::from_secs(1));

    let monitoring_handle = tokio::spawn(monitoring::run(args.monitoring_address, shutdown.clone()));

    let pipeline_result = match args.command {
        Command::Live { config: config_path } => {
            let env = Environment::load(false).context("loading environment")?;
            let live_config = config::load_live_config(&config_path)?;
            live::run(live_config, env, shutdown.clone()).await
        }
        Command::Historical { config: config_path, event_id, contract_address, from_block, to_block } => {
            let env = Environment::load(true).context("loading environment")?;
            let historical_config = config::load_historical_config(&config_path)?;
            let request = BackfillRequest { event_id, contract_address, from_block, to_block };
            historical::run_backfill_job(request, historical_config, env)
                .await
                .map(|_| ())
        }
    };

    shutdown.shutdown();
    let _ = monitoring_handle.await;
    pipeline_result
}
