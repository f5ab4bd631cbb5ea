use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use log::debug;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::PendingNotification;

use super::dispatcher::ChannelDispatcher;

/// Where a flushed batch goes.
#[async_trait]
pub trait BatchSink: Send + Sync + 'static {
    async fn deliver(&self, batch: Vec<PendingNotification>);
}

#[async_trait]
impl BatchSink for ChannelDispatcher {
    async fn deliver(&self, batch: Vec<PendingNotification>) {
        self.dispatch(batch).await;
    }
}

#[derive(Default)]
struct BufferState {
    items: Vec<PendingNotification>,
}

fn lock(state: &Mutex<BufferState>) -> MutexGuard<'_, BufferState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Debounced accumulator for newly entered reports.
///
/// Holds a single flush timer. Every `add` cancels and reschedules it, so a
/// burst of scans yields one consolidated batch. Dropping the buffer (or
/// calling [`discard`](Self::discard)) cancels the timer without flushing.
pub struct NotificationBuffer {
    debounce: Duration,
    sink: Arc<dyn BatchSink>,
    state: Arc<Mutex<BufferState>>,
    flush_timer: Option<JoinHandle<()>>,
    halt: CancellationToken,
}

impl NotificationBuffer {
    pub fn new(debounce: Duration, sink: Arc<dyn BatchSink>) -> Self {
        Self {
            debounce,
            sink,
            state: Arc::new(Mutex::new(BufferState::default())),
            flush_timer: None,
            halt: CancellationToken::new(),
        }
    }

    /// Tie the flush timer to an outer token. Once it is cancelled no flush
    /// starts, even if the timer already expired.
    pub fn with_halt_token(mut self, halt: CancellationToken) -> Self {
        self.halt = halt;
        self
    }

    /// Queue a notification and restart the debounce window. Returns `false`
    /// when the report was already waiting in this batch.
    pub fn add(&mut self, notification: PendingNotification) -> bool {
        let inserted = {
            let mut state = lock(&self.state);
            let duplicate = state
                .items
                .iter()
                .any(|item| item.report_id == notification.report_id);
            if !duplicate {
                state.items.push(notification);
            }
            !duplicate
        };

        self.reschedule();
        inserted
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn has_scheduled_flush(&self) -> bool {
        self.flush_timer
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Drop everything pending without dispatching. Returns how many
    /// notifications were thrown away.
    pub fn discard(&mut self) -> usize {
        self.cancel_timer();
        let mut state = lock(&self.state);
        let dropped = state.items.len();
        *state = BufferState::default();
        dropped
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.flush_timer.take() {
            handle.abort();
        }
    }

    fn reschedule(&mut self) {
        self.cancel_timer();

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let debounce = self.debounce;
        let halt = self.halt.clone();

        self.flush_timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {}
                _ = halt.cancelled() => return,
            }
            if halt.is_cancelled() {
                return;
            }

            // No await between here and the spawn below, so an abort from a
            // late `add` either lands before the take or not at all.
            let batch = std::mem::take(&mut *lock(&state)).items;
            if batch.is_empty() {
                return;
            }

            debug!("flushing {} buffered proximity notification(s)", batch.len());
            // Detached so rescheduling the timer can never cancel a dispatch.
            // The dispatcher itself queues batches that overlap.
            tokio::spawn(async move { sink.deliver(batch).await });
        }));
    }
}

impl Drop for NotificationBuffer {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
