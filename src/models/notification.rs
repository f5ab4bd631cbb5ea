use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::CompassDirection;

use super::ReportPriority;

/// OS notification permission as reported by the host platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

/// A report that just entered the detection radius, waiting in the buffer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub report_id: String,
    pub name: String,
    pub description: Option<String>,
    pub distance_meters: f64,
    pub distance_text: String,
    pub direction: CompassDirection,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub priority: ReportPriority,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
}

/// A persisted notification row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
