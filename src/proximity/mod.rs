pub mod detector;
pub mod scanner;
pub mod state;

pub use detector::{Transition, TransitionDetector, DEFAULT_RADIUS_METERS};
pub use scanner::{CandidateScanner, ReportSource};
pub use state::ProximityStateStore;
