//! Fakes and fixtures shared by the unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::alerts::buffer::BatchSink;
use crate::alerts::{ConsolidatedToast, NotificationStore, PushNotification, PushNotifier, ToastPresenter};
use crate::events::{ReportEvent, ReportEventBus, ReportSubscription};
use crate::geo::{CompassDirection, Coordinate};
use crate::models::{
    Candidate, NotificationPermission, PendingNotification, Report, ReportPriority, ReportStatus,
};
use crate::proximity::ReportSource;

pub fn report_at(id: &str, latitude: f64, longitude: f64) -> Report {
    Report {
        id: id.to_string(),
        name: format!("Report {id}"),
        description: Some("Broken streetlight".into()),
        status: ReportStatus::Pending,
        priority: ReportPriority::Medium,
        location: Coordinate::new(latitude, longitude),
        owner_id: "someone-else".into(),
        category_name: Some("Infrastructure".into()),
        category_color: Some("#f59e0b".into()),
        address: Some("Main quad".into()),
    }
}

pub fn candidate_at(id: &str, latitude: f64, longitude: f64) -> Candidate {
    Candidate::from_report(report_at(id, latitude, longitude)).unwrap()
}

pub fn pending(id: &str, distance_meters: f64) -> PendingNotification {
    PendingNotification {
        report_id: id.to_string(),
        name: id.to_string(),
        description: None,
        distance_meters,
        distance_text: crate::geo::format_distance(distance_meters),
        direction: CompassDirection::N,
        address: Some("Library".into()),
        latitude: 0.0,
        longitude: 0.0,
        priority: ReportPriority::High,
        category_name: None,
        category_color: None,
    }
}

#[derive(Default)]
pub struct FakeReportSource {
    reports: Mutex<Vec<Report>>,
    failures_left: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    queries: AtomicUsize,
    bus: ReportEventBus,
}

impl FakeReportSource {
    pub fn with_reports(reports: Vec<Report>) -> Self {
        let source = Self::default();
        source.set_reports(reports);
        source
    }

    pub fn set_reports(&self, reports: Vec<Report>) {
        *self.reports.lock().unwrap() = reports;
    }

    pub fn fail_next_queries(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn publish(&self, event: ReportEvent) -> usize {
        self.bus.publish(event)
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}

#[async_trait]
impl ReportSource for FakeReportSource {
    async fn list_active_reports(&self, exclude_owner: &str) -> Result<Vec<Report>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            bail!("store unavailable");
        }

        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|report| report.owner_id != exclude_owner)
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> ReportSubscription {
        self.bus.subscribe()
    }
}

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub metadata: serde_json::Value,
}

#[derive(Default)]
pub struct FakeNotificationStore {
    rows: Mutex<Vec<StoredRow>>,
    failing_reports: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeNotificationStore {
    pub fn rows(&self) -> Vec<StoredRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn set_insert_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_for(&self, report_id: &str) {
        self.failing_reports.lock().unwrap().push(report_id.to_string());
    }
}

#[async_trait]
impl NotificationStore for FakeNotificationStore {
    async fn insert(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: serde_json::Value,
    ) -> Result<String> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let report_id = metadata["reportId"].as_str().unwrap_or_default().to_string();
        if self.failing_reports.lock().unwrap().contains(&report_id) {
            bail!("insert rejected for {report_id}");
        }

        let mut rows = self.rows.lock().unwrap();
        rows.push(StoredRow {
            user_id: user_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            metadata,
        });
        Ok(format!("n-{}", rows.len()))
    }
}

#[derive(Default)]
pub struct FakeToastPresenter {
    shown: Mutex<Vec<ConsolidatedToast>>,
    fail_next: AtomicBool,
}

impl FakeToastPresenter {
    pub fn all(&self) -> Vec<ConsolidatedToast> {
        self.shown.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ConsolidatedToast> {
        self.shown.lock().unwrap().last().cloned()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl ToastPresenter for FakeToastPresenter {
    fn show(&self, toast: ConsolidatedToast) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("toast surface unavailable");
        }
        self.shown.lock().unwrap().push(toast);
        Ok(())
    }
}

pub struct FakePushNotifier {
    permission: Mutex<NotificationPermission>,
    grant_on_request: AtomicBool,
    shown: Mutex<Vec<PushNotification>>,
}

impl FakePushNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
            grant_on_request: AtomicBool::new(true),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn deny_requests(&self) {
        self.grant_on_request.store(false, Ordering::SeqCst);
    }

    pub fn shown(&self) -> Vec<PushNotification> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushNotifier for FakePushNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> Result<NotificationPermission> {
        let mut permission = self.permission.lock().unwrap();
        if *permission == NotificationPermission::Default {
            *permission = if self.grant_on_request.load(Ordering::SeqCst) {
                NotificationPermission::Granted
            } else {
                NotificationPermission::Denied
            };
        }
        Ok(*permission)
    }

    fn show(&self, notification: PushNotification) -> Result<()> {
        self.shown.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Forwards flushed batches to a channel the test can await on.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<PendingNotification>>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<PendingNotification>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl BatchSink for ChannelSink {
    async fn deliver(&self, batch: Vec<PendingNotification>) {
        let _ = self.tx.send(batch);
    }
}
