use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::NotificationPermission;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TriggerState {
    #[default]
    Disabled,
    Armed,
}

/// Conditions that must all hold before the scheduler arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmingConditions {
    pub enabled: bool,
    pub supported: bool,
    pub tracking: bool,
    pub has_location: bool,
}

impl ArmingConditions {
    pub fn desired_state(&self) -> TriggerState {
        if self.enabled && self.supported && self.tracking && self.has_location {
            TriggerState::Armed
        } else {
            TriggerState::Disabled
        }
    }
}

/// Read-only status for the UI.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub trigger_state: TriggerState,
    pub is_enabled: bool,
    pub is_supported: bool,
    pub is_tracking: bool,
    pub has_location: bool,
    pub last_fix_at: Option<DateTime<Utc>>,
    pub radius_meters: f64,
    pub notification_permission: NotificationPermission,
}
