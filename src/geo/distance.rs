use serde::Serialize;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

const COMPASS_POINTS: [CompassDirection; 8] = [
    CompassDirection::N,
    CompassDirection::NE,
    CompassDirection::E,
    CompassDirection::SE,
    CompassDirection::S,
    CompassDirection::SW,
    CompassDirection::W,
    CompassDirection::NW,
];

/// A WGS84 point. Only built through [`Coordinate::new`], so a value in hand is
/// always finite and within range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompassDirection {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl CompassDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompassDirection::N => "N",
            CompassDirection::NE => "NE",
            CompassDirection::E => "E",
            CompassDirection::SE => "SE",
            CompassDirection::S => "S",
            CompassDirection::SW => "SW",
            CompassDirection::W => "W",
            CompassDirection::NW => "NW",
        }
    }
}

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Great-circle distance in meters between two raw lat/lng pairs.
///
/// Takes plain floats so callers holding unvalidated data get NaN back
/// instead of a panic; NaN in, NaN out.
pub fn haversine_meters(lat_1: f64, lng_1: f64, lat_2: f64, lng_2: f64) -> f64 {
    let lat1_rad = to_radians(lat_1);
    let lat2_rad = to_radians(lat_2);
    let dlat = to_radians(lat_2 - lat_1);
    let dlng = to_radians(lng_2 - lng_1);

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_meters(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Initial bearing from `a` to `b`, in degrees within `[0, 360)`.
pub fn bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = to_radians(a.latitude);
    let lat2 = to_radians(b.latitude);
    let dlng = to_radians(b.longitude - a.longitude);

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    let degrees = to_degrees(y.atan2(x)).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}

pub fn bearing_to_compass(degrees: f64) -> CompassDirection {
    let index = (degrees / 45.0).round().rem_euclid(8.0) as usize;
    COMPASS_POINTS[index % COMPASS_POINTS.len()]
}

/// Human readable distance: whole meters under a kilometer, one decimal above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn identical_points_are_zero_meters_apart() {
        for (lat, lng) in [(0.0, 0.0), (19.4326, -99.1332), (-33.45, -70.66), (89.9, 179.9)] {
            let p = coord(lat, lng);
            assert_eq!(distance(&p, &p), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = coord(19.3320, -99.1870);
        let b = coord(19.3350, -99.1801);
        assert!((distance(&a, &b) - distance(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn small_longitude_offset_at_equator() {
        // 0.0009 degrees of longitude on the equator is ~100.08 m
        let d = distance(&coord(0.0, 0.0), &coord(0.0, 0.0009));
        assert!((d - 100.08).abs() < 0.1, "got {d}");
    }

    #[test]
    fn nan_propagates() {
        assert!(haversine_meters(f64::NAN, 0.0, 0.0, 0.0).is_nan());
    }

    #[test]
    fn coordinate_rejects_out_of_range_values() {
        assert!(Coordinate::new(91.0, 0.0).is_none());
        assert!(Coordinate::new(0.0, -181.0).is_none());
        assert!(Coordinate::new(f64::NAN, 0.0).is_none());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_none());
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = coord(0.0, 0.0);
        assert!((bearing(&origin, &coord(1.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!((bearing(&origin, &coord(0.0, 1.0)) - 90.0).abs() < 1e-6);
        assert!((bearing(&origin, &coord(-1.0, 0.0)) - 180.0).abs() < 1e-6);
        assert!((bearing(&origin, &coord(0.0, -1.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn compass_rounds_to_nearest_octant() {
        assert_eq!(bearing_to_compass(0.0), CompassDirection::N);
        assert_eq!(bearing_to_compass(22.4), CompassDirection::N);
        assert_eq!(bearing_to_compass(22.5), CompassDirection::NE);
        assert_eq!(bearing_to_compass(135.0), CompassDirection::SE);
        assert_eq!(bearing_to_compass(300.0), CompassDirection::NW);
        assert_eq!(bearing_to_compass(350.0), CompassDirection::N);
    }

    #[test]
    fn formats_meters_and_kilometers() {
        assert_eq!(format_distance(85.4), "85 m");
        assert_eq!(format_distance(999.4), "999 m");
        assert_eq!(format_distance(1234.0), "1.2 km");
    }
}
