pub mod utils;

pub mod alerts;
pub mod db;
pub mod engine;
pub mod events;
pub mod geo;
pub mod models;
pub mod proximity;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

pub use alerts::{
    ConsolidatedToast, NotificationStore, PushNotification, PushNotifier, ToastAction, ToastItem,
    ToastPresenter,
};
pub use db::{Database, NewReport};
pub use engine::{EngineParts, EngineSnapshot, PositionFeed, ProximityEngine, TriggerState};
pub use events::{ReportEvent, ReportEventBus, ReportSubscription};
pub use geo::Coordinate;
pub use models::{NotificationPermission, Report, ReportPriority, ReportStatus, UserPosition};
pub use proximity::ReportSource;
pub use settings::{ProximitySettings, SettingsStore};
pub use utils::logging::init_logging;

/// Platform hooks the host application provides for one signed-in user.
pub struct HostSurfaces {
    pub feed: PositionFeed,
    pub toasts: Arc<dyn ToastPresenter>,
    pub push: Arc<dyn PushNotifier>,
}

/// A running proximity pipeline for one user, wired to the on-disk store.
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub engine: ProximityEngine,
}

impl AppState {
    /// Open `proximity.sqlite3` and `settings.json` under `data_dir` and start
    /// the engine. Must be called from within a tokio runtime.
    pub fn open(data_dir: &Path, user_id: &str, surfaces: HostSurfaces) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("proximity.sqlite3"), ReportEventBus::new())?;
        let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);

        let engine = ProximityEngine::new(EngineParts {
            user_id: user_id.to_string(),
            settings: Arc::clone(&settings),
            feed: surfaces.feed,
            reports: Arc::new(db.clone()),
            notifications: Arc::new(db.clone()),
            toasts: surfaces.toasts,
            push: surfaces.push,
        });
        engine.start()?;

        log::info!("Proximity alerts ready for user {user_id}");

        Ok(Self {
            db,
            settings,
            engine,
        })
    }

    /// Sign-out: stop the engine. Nothing pending is delivered afterwards.
    pub async fn close(self) {
        self.engine.shutdown().await;
    }
}
