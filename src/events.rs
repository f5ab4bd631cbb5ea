//! In-process pub/sub for report inserts and updates.
//!
//! The bus is owned by whoever composes the engine and handed to both the
//! publishing side (the report store) and the subscribing side (the scan
//! worker). Dropping a [`ReportSubscription`] unsubscribes it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use log::warn;
use tokio::sync::mpsc;

use crate::models::{Report, ReportPriority};

const SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    Created(Report),
    Updated {
        previous_priority: Option<ReportPriority>,
        report: Report,
    },
}

impl ReportEvent {
    pub fn report(&self) -> &Report {
        match self {
            ReportEvent::Created(report) => report,
            ReportEvent::Updated { report, .. } => report,
        }
    }

    pub fn into_report(self) -> Report {
        match self {
            ReportEvent::Created(report) => report,
            ReportEvent::Updated { report, .. } => report,
        }
    }

    /// New reports always qualify; updates only when they escalate into
    /// high or urgent. An unknown previous priority counts as an escalation.
    pub fn warrants_immediate_scan(&self) -> bool {
        match self {
            ReportEvent::Created(_) => true,
            ReportEvent::Updated {
                previous_priority,
                report,
            } => {
                report.priority.is_elevated()
                    && !previous_priority.map(|p| p.is_elevated()).unwrap_or(false)
            }
        }
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<ReportEvent>>,
}

#[derive(Clone, Default)]
pub struct ReportEventBus {
    inner: Arc<Mutex<BusInner>>,
}

fn lock(inner: &Mutex<BusInner>) -> MutexGuard<'_, BusInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ReportEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ReportSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut guard = lock(&self.inner);
        let id = guard.next_id;
        guard.next_id = guard.next_id.wrapping_add(1);
        guard.subscribers.insert(id, tx);

        ReportSubscription {
            id,
            bus: Arc::downgrade(&self.inner),
            receiver: rx,
        }
    }

    /// Deliver to every live subscriber without waiting. Returns how many
    /// subscribers accepted the event.
    pub fn publish(&self, event: ReportEvent) -> usize {
        let mut guard = lock(&self.inner);
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in guard.subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "report event for {} dropped: subscriber {id} is full",
                        event.report().id
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            guard.subscribers.remove(&id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }
}

/// Receiving end of a bus subscription; unsubscribes on drop.
pub struct ReportSubscription {
    id: u64,
    bus: Weak<Mutex<BusInner>>,
    receiver: mpsc::Receiver<ReportEvent>,
}

impl ReportSubscription {
    pub async fn recv(&mut self) -> Option<ReportEvent> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ReportSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            lock(&inner).subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::report_at;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = ReportEventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let delivered = bus.publish(ReportEvent::Created(report_at("r-1", 0.0, 0.0)));

        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.unwrap().report().id, "r-1");
        assert_eq!(second.recv().await.unwrap().report().id, "r-1");
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = ReportEventBus::new();
        let subscription = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        subscription.unsubscribe();

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(ReportEvent::Created(report_at("r-1", 0.0, 0.0))), 0);
    }

    #[test]
    fn escalation_detection() {
        let mut report = report_at("r-1", 0.0, 0.0);
        report.priority = ReportPriority::Urgent;

        let escalated = ReportEvent::Updated {
            previous_priority: Some(ReportPriority::Low),
            report: report.clone(),
        };
        let already_high = ReportEvent::Updated {
            previous_priority: Some(ReportPriority::High),
            report: report.clone(),
        };
        let unknown_previous = ReportEvent::Updated {
            previous_priority: None,
            report: report.clone(),
        };

        report.priority = ReportPriority::Medium;
        let not_elevated = ReportEvent::Updated {
            previous_priority: Some(ReportPriority::Low),
            report,
        };

        assert!(escalated.warrants_immediate_scan());
        assert!(!already_high.warrants_immediate_scan());
        assert!(unknown_previous.warrants_immediate_scan());
        assert!(!not_elevated.warrants_immediate_scan());
    }
}
