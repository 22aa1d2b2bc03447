use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LogFormat, LoggingConfig, StoreBackend, TollgateConfig};
use tollgate::http::{Admission, HttpServer, TodoStore};
use tollgate::ratelimit::RateLimiter;
use tollgate::store;

/// Command-line arguments. Flags override file and environment values.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Counter store backend
    #[arg(long, value_enum)]
    backend: Option<StoreBackend>,

    /// Redis connection URL
    #[arg(long)]
    redis_url: Option<String>,
}

impl Args {
    /// Overwrite the values given on the command line.
    fn apply(self, config: &mut TollgateConfig) {
        if let Some(listen) = self.listen {
            config.server.listen_addr = listen;
        }
        if let Some(backend) = self.backend {
            config.store.backend = backend;
        }
        if let Some(url) = self.redis_url {
            config.store.redis_url = Some(url);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        backend = ?config.store.backend,
        limit = config.rate_limiting.limit,
        window_secs = config.rate_limiting.window_secs,
        failure_policy = ?config.rate_limiting.failure_policy,
        "Configuration loaded"
    );

    let counter_store = store::from_config(&config.store).await?;

    let rate_limiter = RateLimiter::new(counter_store, config.rate_limiting.policy())
        .with_prefix(config.rate_limiting.key_prefix.clone())
        .with_timeout(config.store.timeout());

    let admission = Admission::new(Arc::new(rate_limiter))
        .with_key_strategy(Arc::from(config.rate_limiting.key_strategy.build()))
        .with_failure_policy(config.rate_limiting.failure_policy)
        .with_headers(config.rate_limiting.expose_headers);

    let server = HttpServer::new(config.server.listen_addr, admission, Arc::new(TodoStore::new()));

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
