pub mod distance;

pub use distance::{
    bearing, bearing_to_compass, distance, format_distance, CompassDirection, Coordinate,
};
