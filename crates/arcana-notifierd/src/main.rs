use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use arcana_channels::{EmailChannel, HttpPusher, PushChannel, SmtpMailer};
use arcana_scheduler::{DispatchRouter, JobRegistry, NotifyEngine};
use arcana_store::{SqliteStore, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcana_notifierd=info,arcana_scheduler=info".into()),
        )
        .init();

    // load config: explicit path > ARCANA_CONFIG env > ~/.arcana/arcana.toml
    let config_path = std::env::var("ARCANA_CONFIG").ok();
    let config = arcana_core::ArcanaConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        arcana_core::ArcanaConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = rusqlite::Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let store = Arc::new(SqliteStore::new(conn)?);
    let store: Arc<dyn UserStore> = store;

    // channel adapters — a missing config section simply disables that channel
    let email: Option<Arc<dyn EmailChannel>> = match &config.channels.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp)?;
            info!(host = %smtp.host, from = %smtp.from_address, "email channel enabled");
            Some(Arc::new(mailer))
        }
        None => {
            tracing::warn!("no [channels.smtp] section — email channel disabled");
            None
        }
    };
    let push: Option<Arc<dyn PushChannel>> = match &config.channels.push {
        Some(push_cfg) => {
            info!(ttl_secs = push_cfg.ttl_secs, "push channel enabled");
            Some(Arc::new(HttpPusher::new(push_cfg)))
        }
        None => {
            tracing::warn!("no [channels.push] section — push channel disabled");
            None
        }
    };

    let router = Arc::new(DispatchRouter::new(
        Arc::clone(&store),
        email,
        push,
        Duration::from_millis(config.scheduler.dispatch_timeout_ms),
    ));
    let engine = Arc::new(NotifyEngine::new(
        Arc::clone(&store),
        Arc::clone(&router),
        &config.scheduler,
    ));
    // The registry serves the host application's milestone flows; the
    // daemon owns its lifecycle so outstanding timers die with the process.
    let registry = JobRegistry::new(store, router);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    info!("arcana notifier running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    registry.shutdown();
    let _ = engine_task.await;
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
