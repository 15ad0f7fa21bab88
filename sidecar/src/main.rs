use clap::Parser;
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use directory::{DirectoryClient, DirectoryError};
use reloader::{Controller, ProcessLauncher};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod config;

const EVENT_CHANNEL_SIZE: usize = 256;
const METRICS_PREFIX: &str = "haproxy_sidecar";

/// Keeps an HAProxy configuration in sync with the service directory.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// YAML file overriding the built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum SidecarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory client error: {0}")]
    Directory(#[from] DirectoryError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(config.common.logging.as_ref());

    if let Some(metrics_config) = &config.common.metrics {
        init_metrics(metrics_config);
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Sidecar stopped");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .init();

    guard
}

/// Metrics are best-effort: a broken statsd setup is logged, not fatal.
fn init_metrics(config: &MetricsConfig) {
    let recorder = match metrics_exporter_statsd::StatsdBuilder::from(
        config.statsd_host.clone(),
        config.statsd_port,
    )
    .build(Some(METRICS_PREFIX))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "Could not create statsd exporter");
            return;
        }
    };

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::error!("A metrics recorder is already installed");
        return;
    }

    shared::metrics_defs::describe_all(reloader::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(directory::metrics_defs::ALL_METRICS);
}

async fn run(config: Config) -> Result<(), SidecarError> {
    std::fs::create_dir_all(&config.haproxy.run_dir)?;

    let directory = DirectoryClient::new(&config.directory)?;
    let controller = Controller::new(config.haproxy, &config.debounce, Arc::new(ProcessLauncher));

    if let Some(listener) = config.admin_listener {
        let admin = AdminService::new(controller.ready_flag());
        tokio::spawn(async move {
            if let Err(e) = run_http_service(&listener.host, listener.port, admin).await {
                tracing::error!(error = %e, "Admin listener failed");
            }
        });
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    tokio::spawn(directory.run(tx));

    tracing::info!(directory = %config.directory.host, "Starting haproxy sidecar");

    tokio::select! {
        _ = controller.run(rx) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Received interrupt, shutting down"),
    }

    Ok(())
}
