//! modrpc: serves registered modules over HTTP.
//!
//! Usage:
//!   modrpc                                  # 127.0.0.1:7080, one worker per core
//!   modrpc --port 8080 --workers 16         # Custom port and pool size
//!   modrpc --allow-origin https://app.test  # Restrict CORS origins
//!
//! Calls are `POST /?module=<id>&method=<id>` with a JSON array body;
//! `GET /?module=<id>` returns the module's descriptor.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use modrpc::app::{AppConfig, build_service};
use modrpc_server::ServiceConfig;
use modrpc_server::handlers::{CorsConfig, RequestLimiterConfig};
use modrpc_transport::HttpTransportConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modrpc", about = "modrpc server: module RPC over HTTP")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7080")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Worker loops (defaults to available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Requests allowed per remote address per window (0 disables limiting)
    #[arg(long, default_value = "600")]
    max_requests: usize,

    /// Rate-limit window in seconds
    #[arg(long, default_value = "60")]
    window_secs: u64,

    /// Allowed CORS origin (repeatable; any origin when omitted)
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        let mut cors = CorsConfig::default();
        if !self.allow_origins.is_empty() {
            cors.allowed_origins = self.allow_origins.clone();
        }
        let mut service = ServiceConfig::default();
        if let Some(workers) = self.workers {
            service.workers = workers;
        }

        AppConfig {
            transport: HttpTransportConfig {
                hostname: self.hostname.clone(),
                port: self.port,
                ..HttpTransportConfig::default()
            },
            service,
            cors,
            limiter: (self.max_requests > 0).then(|| RequestLimiterConfig {
                window: Duration::from_secs(self.window_secs),
                max_requests: self.max_requests,
            }),
            timeout: Duration::from_millis(self.timeout_ms),
            ..AppConfig::default()
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if let Some(ref log_path) = cli.log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("opening log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = cli.app_config();
    let service = build_service(&config).context("invalid module configuration")?;
    info!("Pipeline: {}", service.pipeline().names().join(" -> "));

    service.start().await.context("starting service")?;
    info!(
        "modrpc listening on http://{}:{} ({} workers)",
        config.transport.hostname,
        service.transport().port(),
        service.config().workers
    );

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    info!("Shutdown requested");

    service.stop().await.context("stopping service")?;
    Ok(())
}
