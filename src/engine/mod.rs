pub mod controller;
pub mod loop_worker;
pub mod position;
pub mod state;

pub use controller::{EngineParts, ProximityEngine};
pub use position::PositionFeed;
pub use state::{EngineSnapshot, TriggerState};
