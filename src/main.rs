//! bucket-registry -- provider registry served from an object-storage bucket.
//!
//! Startup loads the config, builds the store and key material, populates
//! the index, then serves until SIGTERM/SIGINT.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bucket_registry::config::Config;
use bucket_registry::index::BucketIndex;
use bucket_registry::keys::{GlobalKeys, KeyMaterialProvider, PerArtifactKeys};
use bucket_registry::storage::ObjectStore;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the registry server.
#[derive(Parser, Debug)]
#[command(
    name = "bucket-registry",
    version,
    about = "Provider registry served from an object-storage bucket"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "bucket-registry.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = bucket_registry::config::load_config(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    config.validate()?;

    init_tracing(&config);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        bucket_registry::metrics::init_metrics()?;
        bucket_registry::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store = build_store(&config).await?;
    let keys = build_keys(&config, store.clone())?;

    let state = Arc::new(bucket_registry::AppState::new(config.clone(), store, keys));

    if config.registry.use_index {
        state
            .index
            .refresh()
            .await
            .context("building the initial bucket index")?;
    }

    if config.registry.refresh_interval_seconds > 0 {
        spawn_refresh_task(
            state.index.clone(),
            Duration::from_secs(config.registry.refresh_interval_seconds),
        );
    }

    let app = bucket_registry::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("bucket-registry listening on {}", bind_addr);

    // In-flight requests get `shutdown_timeout` seconds after the signal.
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    let grace = Duration::from_secs(config.server.shutdown_timeout);

    tokio::select! {
        result = server => result?,
        _ = async {
            if signalled_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!("Graceful shutdown exceeded {:?}, exiting", grace);
        }
    }

    info!("bucket-registry shut down");

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let timeout = Duration::from_secs(config.storage.request_timeout_seconds);

    match config.storage.backend.as_str() {
        "aws" => {
            let aws_config = config.storage.aws.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'aws' but storage.aws config section is missing")
            })?;
            let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
            let store = bucket_registry::storage::aws::S3Store::new(
                aws_config.bucket.clone(),
                aws_config.region.clone(),
                aws_config.prefix.clone(),
                non_empty(&aws_config.endpoint_url),
                aws_config.use_path_style,
                non_empty(&aws_config.access_key_id),
                non_empty(&aws_config.secret_access_key),
                timeout,
            )
            .await?;
            Ok(Arc::new(store))
        }
        "local" => {
            let root = &config.storage.local.root_dir;
            let store = bucket_registry::storage::local::LocalStore::new(root, timeout)?;
            info!("Local object store initialized at {}", root);
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown storage.backend '{other}'"),
    }
}

fn build_keys(
    config: &Config,
    store: Arc<dyn ObjectStore>,
) -> anyhow::Result<Arc<dyn KeyMaterialProvider>> {
    let keys = &config.registry.signing_keys;
    match keys.strategy.as_str() {
        "global" => {
            let global = GlobalKeys::from_file(keys.key_id.clone(), &keys.keyfile)?;
            info!("Serving global signing key {}", keys.key_id);
            Ok(Arc::new(global))
        }
        "per_artifact" => {
            info!("Serving per-artifact signing keys from the bucket");
            Ok(Arc::new(PerArtifactKeys::new(store)))
        }
        other => anyhow::bail!("unknown registry.signing_keys.strategy '{other}'"),
    }
}

/// Rebuild the index every `period`. Failures are logged by the index and
/// the previous snapshot stays in service.
fn spawn_refresh_task(index: Arc<BucketIndex>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already refreshed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let _ = index.refresh().await;
        }
    });
    info!("Background index refresh every {:?}", period);
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
