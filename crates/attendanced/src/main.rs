use std::sync::Arc;

use anyhow::{Context, Result};
use attendance_core::{NewSession, Session, SessionStore};
use attendance_store::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod tracker;

use config::Config;
use dbus_interface::AttendanceService;
use tracker::{ReplayFactory, TrackerRegistry};

const BUS_NAME: &str = "org.classroom.Attendance1";
const OBJECT_PATH: &str = "/org/classroom/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("attendanced starting");

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        feed = %config.feed_path.display(),
        threshold = config.match_threshold,
        tick_ms = config.tick_interval.as_millis() as u64,
        "configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .await
            .context("failed to open attendance database")?,
    );
    seed(store.as_ref(), config.seed_session.as_deref()).await?;

    let tracker = Arc::new(TrackerRegistry::new(
        store.clone(),
        store.clone(),
        Arc::new(ReplayFactory::new(config.clone())),
        config.clone(),
    ));

    let service = AttendanceService {
        sessions: store.clone(),
        attendance: store,
        tracker: tracker.clone(),
        config,
    };

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "attendanced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("attendanced shutting down");
    tracker.stop_all().await;

    Ok(())
}

/// Create the default session when the database has none.
async fn seed(store: &dyn SessionStore, name: Option<&str>) -> Result<Option<Session>> {
    let Some(name) = name else {
        return Ok(None);
    };
    if !store.list_sessions().await?.is_empty() {
        return Ok(None);
    }
    let session = store.create_session(NewSession::active(name)).await?;
    tracing::info!(session_id = session.id, name = %session.name, "seeded initial session");
    Ok(Some(session))
}
