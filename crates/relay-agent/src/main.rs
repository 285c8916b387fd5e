//! Relay: bridges an application platform's event stream to Prometheus.
//!
//! Usage:
//!   relay-agent [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>     Config file path (default: config/relay.toml)
//!   --log-level <LEVEL>     Log level override: trace, debug, info, warn, error
//!   --listen <ADDR>         HTTP listen address override (host:port)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::Registry;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use relay_agent::alert::AlertClient;
use relay_agent::config::AgentConfig;
use relay_agent::ingest::metrics_handler::MetricsBizHandler;
use relay_agent::ingest::EventDispatcher;
use relay_agent::observability::AgentMetrics;
use relay_agent::registry::CollectorRegistry;
use relay_agent::server::{create_router, AppState};
use relay_agent::transport::EventSourceClient;
use relay_common::EVENT_TYPE_METRIC_REPORT;

/// CLI arguments for the relay agent.
#[derive(Parser, Debug)]
#[command(name = "relay-agent")]
#[command(about = "Metric event relay with a Prometheus exposition endpoint")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/relay.toml")]
    config: PathBuf,

    /// Log level override: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    /// HTTP listen address override (host:port)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let mut config = if args.config.exists() {
        AgentConfig::from_file(&args.config)
            .with_context(|| format!("failed to load config from {:?}", args.config))?
    } else {
        eprintln!(
            "Warning: config file not found at {:?}, using defaults",
            args.config
        );
        AgentConfig::default()
    };

    // Environment overrides (credentials), then CLI overrides.
    config.apply_env_overrides();
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    if let Some(listen) = &args.listen {
        let (host, port) = listen
            .rsplit_once(':')
            .context("--listen must be host:port")?;
        config.server.host = host.to_owned();
        config.server.port = port
            .parse()
            .with_context(|| format!("invalid --listen port {:?}", port))?;
    }

    // Initialize logging
    let log_level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;

    config.validate().context("configuration validation failed")?;

    info!("Starting relay agent");
    info!(endpoint = %config.source.endpoint, "Event source");

    // Shared exposition registry, the agent's own instruments, and the
    // dynamic collector registry.
    let exposition = Registry::new();
    let metrics = Arc::new(
        AgentMetrics::register(&exposition).context("failed to register agent metrics")?,
    );
    let registry = Arc::new(CollectorRegistry::new(
        exposition.clone(),
        Arc::new(config.metrics.clone()),
    ));
    registry
        .eager_register()
        .context("failed to provision schema-declared collectors")?;

    // Ingestion pipeline: one handler factory per event kind.
    let mut dispatcher =
        EventDispatcher::new(Arc::clone(&metrics), config.source.verify_token.clone());
    {
        let registry = Arc::clone(&registry);
        let metrics = Arc::clone(&metrics);
        dispatcher.register(EVENT_TYPE_METRIC_REPORT, move || {
            Box::new(MetricsBizHandler::new(
                Arc::clone(&registry),
                Arc::clone(&metrics),
            ))
        });
    }
    let dispatcher = Arc::new(dispatcher);

    let (shutdown_tx, _) = broadcast::channel(1);

    // Event source subscription
    let source = EventSourceClient::new(config.source.clone(), Arc::clone(&dispatcher));
    let source_handle = tokio::spawn(source.run(shutdown_tx.subscribe()));

    // HTTP surface
    let state = Arc::new(AppState {
        exposition,
        alert: config.alert.webhook_base.clone().map(AlertClient::new),
    });
    let router = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "HTTP server listening");

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_shutdown.recv().await;
    });

    // Handle shutdown signals
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if let Err(e) = wait_for_shutdown().await {
                warn!(error = %e, "shutdown signal handler error");
            }
            info!("Requesting shutdown...");
            let _ = shutdown_tx.send(());
        }
    });

    server.await.context("HTTP server failed")?;
    let _ = source_handle.await;
    info!("Relay agent stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["relay-agent"]).unwrap();
        assert_eq!(args.config.to_str().unwrap(), "config/relay.toml");
        assert!(args.log_level.is_none());
        assert!(args.listen.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::try_parse_from([
            "relay-agent",
            "-c",
            "/etc/relay.toml",
            "--log-level",
            "debug",
            "--listen",
            "127.0.0.1:9100",
        ])
        .unwrap();
        assert_eq!(args.config.to_str().unwrap(), "/etc/relay.toml");
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert_eq!(args.listen, Some("127.0.0.1:9100".to_string()));
    }
}
