use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point on the map in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both coordinates are finite and inside the valid degree ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One device reading. Superseded by the next one, never persisted locally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub point: GeoPoint,
    /// When the device took the reading
    pub captured_at: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            point: GeoPoint::new(latitude, longitude),
            captured_at,
        }
    }

    /// Age of the reading relative to `now`. Readings from the future count as fresh.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.captured_at).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(51.505, -0.09).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_age() {
        let now = Utc::now();
        let pos = Position::new(1.0, 2.0, now - chrono::Duration::seconds(3));
        assert_eq!(pos.age(now), chrono::Duration::seconds(3));

        // Clock skew: device ahead of us
        let ahead = Position::new(1.0, 2.0, now + chrono::Duration::seconds(2));
        assert_eq!(ahead.age(now), chrono::Duration::zero());
    }
}
