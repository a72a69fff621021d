use autometrics::prometheus_exporter;
use confwatch::gather_metrics;
use confwatch::ChangeEvent;
use confwatch::ConfigStore;
use confwatch::Result;
use confwatch::StoreConfig;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = StoreConfig::new()?.validate()?;

    // Initializing Logs
    init_observability();
    prometheus_exporter::init();

    let store = ConfigStore::connect(settings).await?;
    info!("connected to {:?}", store.config().connection.endpoints);

    let keys = store.config().watch.keys.clone();
    if keys.is_empty() {
        warn!("no keys configured, set watch.keys or CONFWATCH__WATCH__KEYS");
    }
    for key in &keys {
        store.watch(key, log_change)?;
    }

    info!("Watching {} key(s). Waiting for CTRL+C signal...", keys.len());
    if let Err(e) = graceful_shutdown().await {
        error!("Failed to listen for shutdown signals: {:?}", e);
    }

    store.shutdown();
    debug!("final metrics:\n{}", gather_metrics());
    info!("Shutdown completed");
    Ok(())
}

fn log_change(event: ChangeEvent) {
    match &event {
        ChangeEvent::Put { key, value, revision } => {
            info!(
                "[rev {}] {} = {}",
                revision,
                key,
                String::from_utf8_lossy(value)
            );
        }
        ChangeEvent::Delete { key, revision } => {
            info!("[rev {}] {} deleted", revision, key);
        }
    }
}

async fn graceful_shutdown() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

fn init_observability() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
