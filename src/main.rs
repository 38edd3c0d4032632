use std::path::Path;
use std::sync::Arc;

use d_alert::alert;
use d_alert::Alert;
use d_alert::AlertAction;
use d_alert::AlertConfig;
use d_alert::AlertWatcherFn;
use d_alert::ClusterStore;
use d_alert::Error;
use d_alert::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = AlertConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.cluster.cluster_id, &settings.cluster.log_dir)?;

    let client = alert::new(&settings.cluster.alert_driver, &settings)?;
    let cluster_id = settings.cluster.cluster_id.clone();

    if let Some(kv) = client.kv_instance() {
        match ClusterStore::new(kv).read_cluster_info().await {
            Ok(db) => info!(
                "cluster {} status {} with {} nodes",
                cluster_id,
                db.status,
                db.node_entries.len()
            ),
            Err(e) => error!("could not read cluster database: {:?}", e),
        }
    }

    let cb: AlertWatcherFn = Arc::new(|alert: Option<&Alert>, action: AlertAction, prefix: &str, key: &str| {
        match (alert, action) {
            (None, AlertAction::None) => error!("alert watch on {} stopped", prefix),
            (None, action) => info!("alert {} {}{}", action, prefix, key),
            (Some(a), action) => info!(
                "alert {} {}{}: id={} resource={} severity={:?} message={:?}",
                action,
                prefix,
                key,
                a.id,
                a.resource.as_str(),
                a.severity,
                a.message
            ),
        }
        Ok(())
    });
    client.watch(&cluster_id, cb).await?;

    info!("Application started. Waiting for CTRL+C signal...");
    wait_for_shutdown().await?;

    alert::shutdown();
    info!("Shutdown completed");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Fatal(format!("Failed to install SIGINT handler: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Fatal(format!("Failed to install SIGTERM handler: {e}")))?;
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

pub fn init_observability(
    cluster_id: &str,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    let dir = log_dir.join(cluster_id);
    std::fs::create_dir_all(&dir)
        .map_err(|e| Error::Fatal(format!("Failed to create log dir {dir:?}: {e}")))?;

    let (non_blocking, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "d-alert.log"));
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
