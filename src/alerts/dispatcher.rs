use std::{sync::Arc, time::Duration};

use serde_json::json;
use tokio::{sync::Mutex, task::JoinSet};
use uuid::Uuid;

use crate::models::{NotificationPermission, PendingNotification};

use super::channels::{
    directions_url, report_route, ConsolidatedToast, NotificationStore, PushNotification,
    PushNotifier, ToastAction, ToastItem, ToastPresenter, PROXIMITY_PUSH_TAG, PROXIMITY_TOAST_ID,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushOutcome {
    #[default]
    NotAttempted,
    Sent,
    SkippedNoPermission,
    Failed,
}

/// What happened to one batch across the three channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub batch_id: Option<String>,
    pub items: usize,
    pub persisted: usize,
    pub persist_failures: usize,
    pub toast_shown: bool,
    pub push: PushOutcome,
}

pub struct ChannelDispatcher {
    user_id: String,
    notifications: Arc<dyn NotificationStore>,
    toasts: Arc<dyn ToastPresenter>,
    push: Arc<dyn PushNotifier>,
    toast_duration: Duration,
    channel_timeout: Duration,
    /// Held for a whole dispatch, so batches go out one at a time and in the
    /// order they were flushed.
    last_batch_id: Mutex<Option<String>>,
}

impl ChannelDispatcher {
    pub fn new(
        user_id: String,
        notifications: Arc<dyn NotificationStore>,
        toasts: Arc<dyn ToastPresenter>,
        push: Arc<dyn PushNotifier>,
        toast_duration: Duration,
        channel_timeout: Duration,
    ) -> Self {
        Self {
            user_id,
            notifications,
            toasts,
            push,
            toast_duration,
            channel_timeout,
            last_batch_id: Mutex::new(None),
        }
    }

    pub async fn last_batch_id(&self) -> Option<String> {
        self.last_batch_id.lock().await.clone()
    }

    /// Fan a consolidated batch out to every channel. Never fails: each
    /// channel logs its own errors and the rest carry on.
    pub async fn dispatch(&self, mut batch: Vec<PendingNotification>) -> DispatchReport {
        if batch.is_empty() {
            return DispatchReport::default();
        }

        batch.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));

        let batch_id = Uuid::new_v4().to_string();
        let mut last_batch_id = self.last_batch_id.lock().await;
        let replaces = last_batch_id.replace(batch_id.clone());

        let ((persisted, persist_failures), toast_shown, push) = tokio::join!(
            self.persist(&batch_id, &batch),
            async { self.show_toast(&batch_id, replaces, &batch) },
            async { self.send_push(&batch) },
        );

        drop(last_batch_id);

        let report = DispatchReport {
            batch_id: Some(batch_id),
            items: batch.len(),
            persisted,
            persist_failures,
            toast_shown,
            push,
        };

        log_info!(
            "proximity batch dispatched: {} item(s), persisted {}/{}, toast={}, push={:?}",
            report.items,
            report.persisted,
            report.items,
            report.toast_shown,
            report.push
        );

        report
    }

    async fn persist(&self, batch_id: &str, batch: &[PendingNotification]) -> (usize, usize) {
        let mut writes = JoinSet::new();

        for item in batch {
            let store = Arc::clone(&self.notifications);
            let user_id = self.user_id.clone();
            let timeout = self.channel_timeout;
            let report_id = item.report_id.clone();
            let title = notification_title(item);
            let body = notification_body(item);
            let metadata = notification_metadata(batch_id, item);

            writes.spawn(async move {
                let result =
                    tokio::time::timeout(timeout, store.insert(&user_id, &title, &body, metadata))
                        .await;
                (report_id, result)
            });
        }

        let mut persisted = 0;
        let mut failed = 0;
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(Ok(_)))) => persisted += 1,
                Ok((report_id, Ok(Err(err)))) => {
                    failed += 1;
                    log_warn!("failed to persist proximity notification for {report_id}: {err:?}");
                }
                Ok((report_id, Err(_))) => {
                    failed += 1;
                    log_warn!(
                        "persisting proximity notification for {report_id} timed out after {}ms",
                        self.channel_timeout.as_millis()
                    );
                }
                Err(join_err) => {
                    failed += 1;
                    log_warn!("notification write task failed: {join_err}");
                }
            }
        }

        (persisted, failed)
    }

    fn show_toast(
        &self,
        batch_id: &str,
        replaces_batch_id: Option<String>,
        batch: &[PendingNotification],
    ) -> bool {
        let items = batch
            .iter()
            .enumerate()
            .map(|(index, item)| ToastItem {
                report_id: item.report_id.clone(),
                name: item.name.clone(),
                description: item.description.clone(),
                distance_text: item.distance_text.clone(),
                direction: item.direction,
                address: item.address.clone(),
                priority: item.priority,
                category_name: item.category_name.clone(),
                category_color: item.category_color.clone(),
                highlighted: index == 0,
                actions: vec![
                    ToastAction::Navigate {
                        url: directions_url(item.latitude, item.longitude),
                    },
                    ToastAction::View {
                        route: report_route(&item.report_id),
                    },
                ],
            })
            .collect();

        let toast = ConsolidatedToast {
            toast_id: PROXIMITY_TOAST_ID.to_string(),
            batch_id: batch_id.to_string(),
            replaces_batch_id,
            title: summary_title(batch.len()),
            items,
            duration_ms: self.toast_duration.as_millis() as u64,
        };

        match self.toasts.show(toast) {
            Ok(()) => true,
            Err(err) => {
                log_warn!("failed to show proximity toast: {err:?}");
                false
            }
        }
    }

    fn send_push(&self, batch: &[PendingNotification]) -> PushOutcome {
        if self.push.permission() != NotificationPermission::Granted {
            return PushOutcome::SkippedNoPermission;
        }

        let Some(nearest) = batch.first() else {
            return PushOutcome::NotAttempted;
        };

        let body = if batch.len() == 1 {
            format!("{} is {} away", nearest.name, nearest.distance_text)
        } else {
            format!("Nearest: {}, {} away", nearest.name, nearest.distance_text)
        };

        let notification = PushNotification {
            tag: PROXIMITY_PUSH_TAG.to_string(),
            title: summary_title(batch.len()),
            body,
            report_id: nearest.report_id.clone(),
            click_url: directions_url(nearest.latitude, nearest.longitude),
        };

        match self.push.show(notification) {
            Ok(()) => PushOutcome::Sent,
            Err(err) => {
                log_warn!("failed to show OS notification: {err:?}");
                PushOutcome::Failed
            }
        }
    }
}

fn summary_title(count: usize) -> String {
    if count == 1 {
        "Incident nearby".to_string()
    } else {
        format!("{count} incidents nearby")
    }
}

fn notification_title(item: &PendingNotification) -> String {
    format!("Incident nearby: {}", item.name)
}

fn notification_body(item: &PendingNotification) -> String {
    let position = format!("{} {} of you", item.distance_text, item.direction.as_str());
    match &item.address {
        Some(address) if !address.is_empty() => format!("{position}, {address}"),
        _ => position,
    }
}

fn notification_metadata(batch_id: &str, item: &PendingNotification) -> serde_json::Value {
    json!({
        "type": "proximity_alert",
        "batchId": batch_id,
        "reportId": item.report_id,
        "distanceMeters": item.distance_meters,
        "distanceText": item.distance_text,
        "latitude": item.latitude,
        "longitude": item.longitude,
        "priority": item.priority.as_str(),
        "categoryName": item.category_name,
        "categoryColor": item.category_color,
    })
}
