use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use orbitald::{
    config::DaemonConfig,
    dispatch::Dispatcher,
    executor::{session::NoBackendFactory, WorkflowExecutor},
    rest, AppContext,
};
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "orbitald",
    about = "Orbital — browser-automation job orchestration daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP API port
    #[arg(long, env = "ORBITAL_PORT")]
    port: Option<u16>,

    /// Data directory for the job database, queue, and artifacts
    #[arg(long, env = "ORBITAL_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ORBITAL_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 0.0.0.0)
    #[arg(long, env = "ORBITAL_BIND")]
    bind_address: Option<String>,

    /// Comma-separated API key allow-list
    #[arg(long, env = "ORBITAL_API_KEYS")]
    api_keys: Option<String>,

    /// Emit logs as JSON lines instead of the compact format
    #[arg(long, env = "ORBITAL_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon (default when no subcommand given).
    ///
    /// Runs the REST API and the dispatch worker pool in the foreground
    /// until interrupted.
    Serve,
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    init_tracing(args.log.as_deref(), args.log_json);

    let runtime = tokio::runtime::Runtime::new()?;
    match args.command.take().unwrap_or(Command::Serve) {
        Command::Serve => runtime.block_on(run_server(args)),
    }
}

fn init_tracing(log: Option<&str>, json: bool) {
    use tracing_subscriber::EnvFilter;

    let log_level = log
        .map(String::from)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::new(log_level))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level))
            .compact()
            .init();
    }
}

async fn run_server(args: Args) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "orbitald starting");

    let config = Arc::new(DaemonConfig::new(
        args.port,
        args.data_dir,
        args.bind_address,
        args.api_keys,
    ));
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        workers = config.dispatch.workers,
        "config loaded"
    );

    let ctx = Arc::new(AppContext::new(config.clone()).await?);

    // Recover entries a previous run left in-flight before workers start.
    let recovered = ctx
        .queue
        .requeue_stale(std::time::Duration::from_secs(0))
        .await?;
    if recovered > 0 {
        info!(count = recovered, "re-queued in-flight entries from previous run");
    }

    // The browser automation backend is an external capability; without one
    // wired in, jobs fail fast with a clear error instead of hanging.
    let sessions = Arc::new(NoBackendFactory);
    let executor = Arc::new(WorkflowExecutor::new(
        ctx.store.clone(),
        sessions,
        config.storage_path.clone(),
        config.app_url.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Arc::new(Dispatcher::new(
        ctx.store.clone(),
        ctx.queue.clone(),
        executor,
        config.dispatch.to_dispatch_config(),
    ));
    dispatcher.start(shutdown_rx.clone());

    let server = tokio::spawn(rest::start_rest_server(ctx.clone(), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received; draining workers");
    let _ = shutdown_tx.send(true);
    let _ = server.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let mut args = Args::parse_from(["orbitald"]);
        // Taking the subcommand must leave the rest of the args usable.
        let command = args.command.take().unwrap_or(Command::Serve);
        assert!(matches!(command, Command::Serve));
        assert!(args.port.is_none());
    }
}
