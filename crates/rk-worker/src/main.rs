//! `rkw`: run a call script against a geometry kernel worker

use std::path::PathBuf;
use std::process;

use clap::Parser;
use rk_worker::script::{Script, ScriptError};
use rk_worker::{
    CacheStats, ConfigError, Dispatcher, OperationRegistry, RpcConfig, TransportError,
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "rkw", version, about = "Run geometry kernel calls through the kernel worker")]
struct Cli {
    /// JSON script: {"runs": [[{"op": ..., "inputs": ...}, ...], ...]}
    #[arg(required_unless_present = "list_ops")]
    script: Option<PathBuf>,

    /// RON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Route calls synchronously on the main thread instead of a worker thread
    #[arg(long)]
    direct: bool,

    /// Print the available operation paths and exit
    #[arg(long)]
    list_ops: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("failed to start worker: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to encode report: {0}")]
    Encode(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rk_worker=info,rk_kernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        error!("{}", err);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if cli.list_ops {
        for id in OperationRegistry::new().operations() {
            println!("{}", id.path());
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => RpcConfig::load(path)?,
        None => RpcConfig::default(),
    };
    // clap guarantees a script unless --list-ops was given
    let Some(script_path) = cli.script else {
        return Ok(());
    };
    let script = Script::load(&script_path)?;
    info!(
        "Loaded {} ({} runs, {} steps)",
        script_path.display(),
        script.runs.len(),
        script.step_count()
    );

    let dispatcher = Dispatcher::new(config.dispatcher.clone());
    let finish: Box<dyn FnOnce() -> Option<CacheStats>> = if cli.direct {
        let worker = dispatcher.attach_direct_worker(rk_kernel::default_kernel(), &config.worker);
        Box::new(move || worker.shutdown())
    } else {
        let worker = dispatcher.spawn_thread_worker(&config.worker, rk_kernel::default_kernel)?;
        Box::new(move || worker.shutdown())
    };

    let mut encode_error = None;
    script
        .execute(&dispatcher, |report| match serde_json::to_string(&report) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                encode_error.get_or_insert_with(|| e.to_string());
            }
        })
        .await?;
    if let Some(message) = encode_error {
        return Err(CliError::Encode(message));
    }

    if dispatcher.protocol_violations() > 0 {
        info!("{} stray responses were discarded", dispatcher.protocol_violations());
    }
    if let Some(stats) = finish() {
        info!(
            "Worker finished: {} cache entries, {} hits, {} misses",
            stats.entries, stats.hits, stats.misses
        );
    }
    Ok(())
}
