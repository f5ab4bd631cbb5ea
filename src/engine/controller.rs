use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, Weak,
};

use anyhow::{bail, Result};
use log::{error, info, warn};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::{ChannelDispatcher, NotificationStore, PushNotifier, ToastPresenter},
    models::NotificationPermission,
    proximity::{CandidateScanner, ReportSource},
    settings::SettingsStore,
};

use super::{
    loop_worker::{scan_loop, ScanContext, ScanMemory},
    position::PositionFeed,
    state::{ArmingConditions, EngineSnapshot, TriggerState},
};

/// Collaborators the host wires into the engine.
pub struct EngineParts {
    pub user_id: String,
    pub settings: Arc<SettingsStore>,
    pub feed: PositionFeed,
    pub reports: Arc<dyn ReportSource>,
    pub notifications: Arc<dyn NotificationStore>,
    pub toasts: Arc<dyn ToastPresenter>,
    pub push: Arc<dyn PushNotifier>,
}

/// Owns the running scan loop, if any.
#[derive(Default)]
struct ScanWorker {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl ScanWorker {
    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn start(&mut self, ctx: ScanContext) -> Result<()> {
        if self.handle.is_some() {
            bail!("proximity scanning already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(scan_loop(ctx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel synchronously; the caller may await the returned handle to know
    /// the loop has fully unwound.
    fn stop(&mut self) -> Option<JoinHandle<()>> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handle.take()
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.stop() {
            handle.abort();
        }
    }
}

struct EngineInner {
    user_id: String,
    settings: Arc<SettingsStore>,
    enabled_tx: watch::Sender<bool>,
    feed: PositionFeed,
    reports: Arc<dyn ReportSource>,
    dispatcher: Arc<ChannelDispatcher>,
    push: Arc<dyn PushNotifier>,
    memory: Arc<tokio::sync::Mutex<ScanMemory>>,
    worker: Mutex<ScanWorker>,
    supervisor: Mutex<Option<Supervisor>>,
    closed: AtomicBool,
}

struct Supervisor {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

async fn join_scan_loop(handle: JoinHandle<()>) {
    if let Err(err) = handle.await {
        if !err.is_cancelled() {
            error!("proximity scan loop failed to join: {err}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl EngineInner {
    fn conditions(&self) -> ArmingConditions {
        ArmingConditions {
            enabled: *self.enabled_tx.borrow(),
            supported: self.feed.is_supported(),
            tracking: self.feed.is_tracking(),
            has_location: self.feed.latest_coordinate().is_some(),
        }
    }

    fn trigger_state(&self) -> TriggerState {
        if lock(&self.worker).is_running() {
            TriggerState::Armed
        } else {
            TriggerState::Disabled
        }
    }

    fn scan_context(&self) -> ScanContext {
        let settings = self.settings.proximity();
        ScanContext {
            scanner: CandidateScanner::new(
                Arc::clone(&self.reports),
                self.user_id.clone(),
                settings.query_timeout(),
            ),
            memory: Arc::clone(&self.memory),
            dispatcher: Arc::clone(&self.dispatcher),
            positions: self.feed.subscribe_position(),
            subscription: self.reports.subscribe(),
            settings,
        }
    }

    /// Move the scheduler towards whatever state the conditions call for.
    async fn reconcile(&self) {
        let conditions = self.conditions();

        let stopped = {
            let mut worker = lock(&self.worker);
            // Checked under the worker lock so a shutdown racing this call
            // either sees our worker or stops us from starting one.
            let desired = if self.closed.load(Ordering::SeqCst) {
                TriggerState::Disabled
            } else {
                conditions.desired_state()
            };
            match (desired, worker.is_running()) {
                (TriggerState::Armed, false) => {
                    if let Err(err) = worker.start(self.scan_context()) {
                        error!("failed to arm proximity scanning: {err:?}");
                    } else {
                        info!("proximity alerts armed for user {}", self.user_id);
                    }
                    None
                }
                (TriggerState::Disabled, true) => {
                    info!("proximity alerts disarmed for user {}", self.user_id);
                    worker.stop()
                }
                _ => None,
            }
        };

        if let Some(handle) = stopped {
            join_scan_loop(handle).await;
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(supervisor) = lock(&self.supervisor).take() {
            supervisor.cancel_token.cancel();
        }
    }
}

/// Composition root and trigger scheduler for proximity alerts.
///
/// Arms the scan loop when the feature is enabled, tracking is on and a fix is
/// available; disarms (tearing down the loop, its event subscription and any
/// pending batch) as soon as one of those stops holding.
#[derive(Clone)]
pub struct ProximityEngine {
    inner: Arc<EngineInner>,
}

impl ProximityEngine {
    pub fn new(parts: EngineParts) -> Self {
        let settings = parts.settings.proximity();
        let (enabled_tx, _) = watch::channel(settings.enabled);

        let dispatcher = Arc::new(ChannelDispatcher::new(
            parts.user_id.clone(),
            parts.notifications,
            parts.toasts,
            Arc::clone(&parts.push),
            settings.toast_duration(),
            settings.channel_timeout(),
        ));

        Self {
            inner: Arc::new(EngineInner {
                user_id: parts.user_id,
                settings: parts.settings,
                enabled_tx,
                feed: parts.feed,
                reports: parts.reports,
                dispatcher,
                push: parts.push,
                memory: Arc::new(tokio::sync::Mutex::new(ScanMemory::new(
                    settings.radius_meters,
                ))),
                worker: Mutex::new(ScanWorker::default()),
                supervisor: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Start watching the feature flag and position feed. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            bail!("proximity engine already shut down");
        }

        let mut supervisor = lock(&self.inner.supervisor);
        if supervisor.is_some() {
            bail!("proximity engine already started");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            self.inner.feed.subscribe_tracking(),
            self.inner.feed.subscribe_position(),
            self.inner.enabled_tx.subscribe(),
            cancel_token.clone(),
        ));
        *supervisor = Some(Supervisor {
            cancel_token,
            handle,
        });
        Ok(())
    }

    /// Stop everything, e.g. on sign-out. Pending notifications are dropped,
    /// proximity memory is cleared and the engine cannot be started again.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let supervisor = lock(&self.inner.supervisor).take();
        if let Some(supervisor) = supervisor {
            supervisor.cancel_token.cancel();
            if let Err(err) = supervisor.handle.await {
                if !err.is_cancelled() {
                    error!("proximity supervisor failed to join: {err}");
                }
            }
        }

        let stopped = lock(&self.inner.worker).stop();
        if let Some(handle) = stopped {
            join_scan_loop(handle).await;
        }

        self.inner.memory.lock().await.forget();
        info!("proximity engine shut down for user {}", self.inner.user_id);
    }

    /// Flip the feature flag, persist it and re-evaluate arming right away.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.settings.set_enabled(enabled)?;
        self.inner.enabled_tx.send_replace(enabled);
        self.inner.reconcile().await;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        *self.inner.enabled_tx.borrow()
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.feed.is_tracking()
    }

    pub fn has_location(&self) -> bool {
        self.inner.feed.latest_coordinate().is_some()
    }

    pub fn notification_permission(&self) -> NotificationPermission {
        self.inner.push.permission()
    }

    /// Ask the platform for notification permission. A failed request counts
    /// as not granted.
    pub async fn request_permission(&self) -> bool {
        match self.inner.push.request_permission().await {
            Ok(permission) => permission == NotificationPermission::Granted,
            Err(err) => {
                warn!("notification permission request failed: {err:?}");
                false
            }
        }
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.inner.trigger_state()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let conditions = self.inner.conditions();
        EngineSnapshot {
            trigger_state: self.trigger_state(),
            is_enabled: conditions.enabled,
            is_supported: conditions.supported,
            is_tracking: conditions.tracking,
            has_location: conditions.has_location,
            last_fix_at: self.inner.feed.latest().map(|fix| fix.timestamp),
            radius_meters: self.inner.settings.proximity().radius_meters,
            notification_permission: self.notification_permission(),
        }
    }
}

async fn supervise(
    engine: Weak<EngineInner>,
    mut tracking: watch::Receiver<bool>,
    mut position: watch::Receiver<Option<crate::models::UserPosition>>,
    mut enabled: watch::Receiver<bool>,
    cancel_token: CancellationToken,
) {
    loop {
        if cancel_token.is_cancelled() {
            break;
        }
        match engine.upgrade() {
            Some(inner) => inner.reconcile().await,
            None => break,
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            changed = tracking.changed() => if changed.is_err() { break },
            changed = position.changed() => if changed.is_err() { break },
            changed = enabled.changed() => if changed.is_err() { break },
        }
    }
}
