//! GhostMesh entry point

use anyhow::Context;
use clap::Parser;
use ghostmesh_cli::{Args, ExitReason, OllamaGenerator, Session, repl};
use ghostmesh_memory::{MemoryStore, create_provider};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so the conversation owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.into_config().context("invalid configuration")?;
    info!("GhostMesh v{}", env!("CARGO_PKG_VERSION"));

    let provider = create_provider(config.embedding.clone())
        .context("failed to create embedding provider")?;
    let store = MemoryStore::open(config.store.clone(), provider)
        .await
        .context("failed to open memory store")?;
    info!(
        "[ready] {} memories loaded from {}",
        store.len(),
        config.store.log_path().display()
    );

    let generator = Arc::new(OllamaGenerator::new(&config.model, config.timeout()));
    let mut session = Session::new(store, generator);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // Checkpoint below even when the loop fails
    let interrupted = match repl::run(&mut session, stdin, &mut stdout, shutdown).await {
        Ok(reason) => {
            info!("Conversation ended: {:?}", reason);
            reason == ExitReason::Interrupted
        }
        Err(e) => {
            error!("Conversation ended on an output error: {}", e);
            false
        }
    };

    session
        .close()
        .await
        .context("failed to checkpoint memory index")?;

    info!("Goodbye!");

    // The runtime would otherwise wait on the stdin read still in flight
    if interrupted {
        std::process::exit(0);
    }
    Ok(())
}
