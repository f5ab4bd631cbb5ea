use crate::geo::{self, Coordinate};
use crate::models::{Candidate, PendingNotification};

use super::state::ProximityStateStore;

/// Inclusive detection radius used when settings do not override it.
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// A candidate that was outside on the previous scan and is inside now.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub candidate: Candidate,
    pub distance_meters: f64,
    pub bearing_degrees: f64,
}

impl Transition {
    pub fn into_pending(self) -> PendingNotification {
        let Transition {
            candidate,
            distance_meters,
            bearing_degrees,
        } = self;

        PendingNotification {
            report_id: candidate.id,
            name: candidate.name,
            description: candidate.description,
            distance_meters,
            distance_text: geo::format_distance(distance_meters),
            direction: geo::bearing_to_compass(bearing_degrees),
            address: candidate.address,
            latitude: candidate.coordinate.latitude(),
            longitude: candidate.coordinate.longitude(),
            priority: candidate.priority,
            category_name: candidate.category_name,
            category_color: candidate.category_color,
        }
    }
}

/// Two-state machine per report: only `Outside -> Inside` produces output.
#[derive(Debug)]
pub struct TransitionDetector {
    radius_meters: f64,
    state: ProximityStateStore,
}

impl TransitionDetector {
    pub fn new(radius_meters: f64) -> Self {
        Self {
            radius_meters,
            state: ProximityStateStore::new(),
        }
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Takes effect on the next evaluation; remembered verdicts are kept.
    pub fn set_radius_meters(&mut self, radius_meters: f64) {
        self.radius_meters = radius_meters;
    }

    pub fn state(&self) -> &ProximityStateStore {
        &self.state
    }

    pub fn reset_all(&mut self) {
        self.state.reset_all();
    }

    /// Run one scan's worth of candidates against the user's position.
    ///
    /// State is written for every candidate with a real distance, whether or
    /// not it transitions.
    pub fn evaluate(&mut self, user: &Coordinate, candidates: &[Candidate]) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for candidate in candidates {
            let distance_meters = geo::distance(user, &candidate.coordinate);
            if distance_meters.is_nan() {
                log::debug!("skipping report {}: distance is NaN", candidate.id);
                continue;
            }

            let is_inside = distance_meters <= self.radius_meters;
            let was_inside = self.state.is_inside(&candidate.id);
            self.state.set_inside(&candidate.id, is_inside);

            if is_inside && !was_inside {
                transitions.push(Transition {
                    candidate: candidate.clone(),
                    distance_meters,
                    bearing_degrees: geo::bearing(user, &candidate.coordinate),
                });
            }
        }

        transitions
    }
}
