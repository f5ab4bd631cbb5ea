use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    alerts::{ChannelDispatcher, NotificationBuffer},
    events::ReportSubscription,
    geo::{self, Coordinate},
    models::{Candidate, UserPosition},
    proximity::{CandidateScanner, TransitionDetector},
    settings::ProximitySettings,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_error, log_info, log_warn};

/// Proximity state that outlives a single armed period. A disarm (tracking
/// blip, lost fix, feature toggle) leaves it alone; only the periodic reset and
/// sign-out clear it.
#[derive(Debug)]
pub struct ScanMemory {
    pub detector: TransitionDetector,
    /// Deadline of the next periodic reset, `None` until the first arm.
    pub next_reset_at: Option<Instant>,
}

impl ScanMemory {
    pub fn new(radius_meters: f64) -> Self {
        Self {
            detector: TransitionDetector::new(radius_meters),
            next_reset_at: None,
        }
    }

    pub fn forget(&mut self) {
        self.detector.reset_all();
        self.next_reset_at = None;
    }
}

/// Everything the scan loop owns for the lifetime of one armed period.
pub struct ScanContext {
    pub settings: ProximitySettings,
    pub memory: Arc<Mutex<ScanMemory>>,
    pub scanner: CandidateScanner,
    pub dispatcher: Arc<ChannelDispatcher>,
    pub positions: watch::Receiver<Option<UserPosition>>,
    pub subscription: ReportSubscription,
}

#[derive(Debug, Clone, Copy)]
enum ScanTrigger {
    Interval,
    Reactive,
}

impl ScanTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            ScanTrigger::Interval => "interval",
            ScanTrigger::Reactive => "reactive",
        }
    }
}

enum ScanOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// The single consumer of every trigger. Scans run here one at a time, so the
/// proximity state is never written by two scans at once.
pub async fn scan_loop(ctx: ScanContext, cancel_token: CancellationToken) {
    let ScanContext {
        settings,
        memory,
        scanner,
        dispatcher,
        mut positions,
        mut subscription,
    } = ctx;

    // A loop still unwinding from the previous armed period may hold it.
    let mut memory = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return,
        guard = memory.lock_owned() => guard,
    };
    memory.detector.set_radius_meters(settings.radius_meters);

    let mut buffer = NotificationBuffer::new(settings.debounce(), dispatcher)
        .with_halt_token(cancel_token.clone());

    let mut ticker = interval(settings.scan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reset_every = settings.state_reset_interval();
    let first_reset = *memory
        .next_reset_at
        .get_or_insert_with(|| Instant::now() + reset_every);
    let mut reset_ticker = interval_at(first_reset, reset_every);
    reset_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The interval's immediate first tick covers the fix we armed with.
    positions.borrow_and_update();

    let mut last_scanned: Option<Coordinate> = None;
    let mut positions_open = true;
    let mut events_open = true;

    log_info!(
        "proximity scan loop armed (radius {}m, every {}s, {} report(s) remembered)",
        memory.detector.radius_meters(),
        settings.scan_interval_secs,
        memory.detector.state().len()
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                break;
            }
            due = reset_ticker.tick() => {
                memory.next_reset_at = Some(due + reset_every);
                let tracked = memory.detector.state().len();
                memory.detector.reset_all();
                log_info!("proximity state reset ({tracked} report(s) forgotten)");
            }
            _ = ticker.tick() => {
                let Some(position) = latest_coordinate(&positions) else {
                    continue;
                };
                match full_scan(ScanTrigger::Interval, position, &scanner, &mut memory.detector, &mut buffer, &cancel_token).await {
                    ScanOutcome::Completed => last_scanned = Some(position),
                    ScanOutcome::Failed => {}
                    ScanOutcome::Cancelled => break,
                }
            }
            changed = positions.changed(), if positions_open => {
                if changed.is_err() {
                    log_warn!("position feed closed; reactive scans disabled");
                    positions_open = false;
                    continue;
                }
                let Some(position) = latest_coordinate(&positions) else {
                    continue;
                };
                if !moved_enough(last_scanned.as_ref(), &position, settings.min_displacement_meters) {
                    continue;
                }
                match full_scan(ScanTrigger::Reactive, position, &scanner, &mut memory.detector, &mut buffer, &cancel_token).await {
                    ScanOutcome::Completed => last_scanned = Some(position),
                    ScanOutcome::Failed => {}
                    ScanOutcome::Cancelled => break,
                }
            }
            event = subscription.recv(), if events_open => {
                let Some(event) = event else {
                    log_warn!("report event stream ended; incremental scans disabled");
                    events_open = false;
                    continue;
                };
                let report_id = event.report().id.clone();
                let Some(candidate) = scanner.incremental(event) else {
                    continue;
                };
                let Some(position) = latest_coordinate(&positions) else {
                    continue;
                };
                log_info!("incremental scan for report {report_id}");
                detect(position, &[candidate], &mut memory.detector, &mut buffer);
            }
        }
    }

    let dropped = buffer.discard();
    log_info!("proximity scan loop shutting down ({dropped} pending notification(s) discarded)");
}

async fn full_scan(
    trigger: ScanTrigger,
    position: Coordinate,
    scanner: &CandidateScanner,
    detector: &mut TransitionDetector,
    buffer: &mut NotificationBuffer,
    cancel_token: &CancellationToken,
) -> ScanOutcome {
    let result = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => return ScanOutcome::Cancelled,
        result = scanner.full_scan() => result,
    };

    match result {
        Ok(candidates) => {
            let entered = detect(position, &candidates, detector, buffer);
            if entered > 0 {
                log_info!(
                    "{} scan: {entered} of {} candidate(s) entered the radius",
                    trigger.as_str(),
                    candidates.len()
                );
            }
            ScanOutcome::Completed
        }
        Err(err) => {
            // State is untouched, so the next tick retries from current truth.
            log_error!("{} scan aborted: {err:?}", trigger.as_str());
            ScanOutcome::Failed
        }
    }
}

fn detect(
    position: Coordinate,
    candidates: &[Candidate],
    detector: &mut TransitionDetector,
    buffer: &mut NotificationBuffer,
) -> usize {
    let transitions = detector.evaluate(&position, candidates);
    let entered = transitions.len();
    for transition in transitions {
        buffer.add(transition.into_pending());
    }
    entered
}

fn latest_coordinate(positions: &watch::Receiver<Option<UserPosition>>) -> Option<Coordinate> {
    positions.borrow().as_ref().and_then(UserPosition::coordinate)
}

fn moved_enough(last: Option<&Coordinate>, current: &Coordinate, min_meters: f64) -> bool {
    match last {
        Some(last) => geo::distance(last, current) > min_meters,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_threshold_is_exclusive() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        // ~11 m and ~22 m east along the equator
        let small = Coordinate::new(0.0, 0.0001).unwrap();
        let large = Coordinate::new(0.0, 0.0002).unwrap();

        assert!(moved_enough(None, &origin, 20.0));
        assert!(!moved_enough(Some(&origin), &origin, 20.0));
        assert!(!moved_enough(Some(&origin), &small, 20.0));
        assert!(moved_enough(Some(&origin), &large, 20.0));
    }
}
