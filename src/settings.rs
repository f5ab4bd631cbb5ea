use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::proximity::DEFAULT_RADIUS_METERS;

/// Tunables for the proximity engine. Defaults are the values the product
/// currently ships with; whether any of them should become user-facing is
/// still a product call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProximitySettings {
    pub enabled: bool,
    pub radius_meters: f64,
    pub scan_interval_secs: u64,
    pub min_displacement_meters: f64,
    pub debounce_ms: u64,
    pub state_reset_secs: u64,
    pub toast_duration_secs: u64,
    pub query_timeout_ms: u64,
    pub channel_timeout_ms: u64,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_meters: DEFAULT_RADIUS_METERS,
            scan_interval_secs: 30,
            min_displacement_meters: 20.0,
            debounce_ms: 500,
            state_reset_secs: 60 * 60,
            toast_duration_secs: 15,
            query_timeout_ms: 10_000,
            channel_timeout_ms: 5_000,
        }
    }
}

impl ProximitySettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn state_reset_interval(&self) -> Duration {
        Duration::from_secs(self.state_reset_secs.max(1))
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_secs(self.toast_duration_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    proximity: ProximitySettings,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Settings that live only for the process, for hosts without a data dir.
    pub fn in_memory(proximity: ProximitySettings) -> Self {
        Self {
            path: None,
            data: RwLock::new(UserSettings { proximity }),
        }
    }

    pub fn proximity(&self) -> ProximitySettings {
        match self.data.read() {
            Ok(guard) => guard.proximity.clone(),
            Err(poisoned) => poisoned.into_inner().proximity.clone(),
        }
    }

    /// Write to disk first; memory only changes once the file holds the
    /// new values.
    pub fn update_proximity(&self, settings: ProximitySettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let updated = UserSettings {
            proximity: settings,
        };
        self.persist(&updated)?;
        *guard = updated;
        Ok(())
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut settings = self.proximity();
        settings.enabled = enabled;
        self.update_proximity(settings)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}
