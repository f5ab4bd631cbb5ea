//! Delivery surfaces the dispatcher fans out to, plus the payloads they take.
//!
//! The host application implements these against its UI toolkit, OS
//! notification API and notification table.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::geo::CompassDirection;
use crate::models::{NotificationPermission, ReportPriority};

/// Stable toast id: a newer consolidated toast replaces the visible one.
pub const PROXIMITY_TOAST_ID: &str = "nearby-incidents";

/// Fixed OS notification tag so repeated batches replace each other.
pub const PROXIMITY_PUSH_TAG: &str = "proximity-alert";

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist one notification row; returns its id.
    async fn insert(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: serde_json::Value,
    ) -> Result<String>;
}

pub trait ToastPresenter: Send + Sync {
    fn show(&self, toast: ConsolidatedToast) -> Result<()>;
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    async fn request_permission(&self) -> Result<NotificationPermission>;

    fn show(&self, notification: PushNotification) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToastAction {
    /// Open the platform's maps app with directions to the coordinates.
    Navigate { url: String },
    /// Open the report inside the app.
    View { route: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToastItem {
    pub report_id: String,
    pub name: String,
    pub description: Option<String>,
    pub distance_text: String,
    pub direction: CompassDirection,
    pub address: Option<String>,
    pub priority: ReportPriority,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub highlighted: bool,
    pub actions: Vec<ToastAction>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedToast {
    pub toast_id: String,
    pub batch_id: String,
    pub replaces_batch_id: Option<String>,
    pub title: String,
    pub items: Vec<ToastItem>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub tag: String,
    pub title: String,
    pub body: String,
    pub report_id: String,
    /// Followed when the user clicks the notification.
    pub click_url: String,
}

pub fn directions_url(latitude: f64, longitude: f64) -> String {
    format!("https://www.google.com/maps/dir/?api=1&destination={latitude},{longitude}")
}

pub fn report_route(report_id: &str) -> String {
    format!("/reports/{report_id}")
}
