use crate::state::{PresenceRecord, Position, Profile};

// Everything the session task reacts to arrives as one of these.
// Feeds, the poller, spawned store calls and the handle all share one channel.
#[derive(Debug)]
pub enum Event {
    // Device location watch produced something
    Location(LocationUpdate),

    // Poller fetched the current visible set (already filtered + capped)
    Presence(Vec<PresenceRecord>),

    // User flipped the visibility toggle
    SetHidden(bool),

    // Re-read our own profile (after a purchase or a toggle)
    RefreshProfile,

    // A profile read finished
    ProfileLoaded(Profile),

    // Map view torn down
    Shutdown,
}

/// Output of a location watch.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationUpdate {
    Fix(Position),
    Error { code: GeoErrorCode, message: String },
}

/// Geolocation error codes as reported by the platform watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl GeoErrorCode {
    /// Map a platform numeric code (1, 2, 3). Anything else is treated as unavailable.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::PermissionDenied,
            3 => Self::Timeout,
            _ => Self::PositionUnavailable,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::PermissionDenied => 1,
            Self::PositionUnavailable => 2,
            Self::Timeout => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_error_codes() {
        assert_eq!(GeoErrorCode::from_code(1), GeoErrorCode::PermissionDenied);
        assert_eq!(GeoErrorCode::from_code(2), GeoErrorCode::PositionUnavailable);
        assert_eq!(GeoErrorCode::from_code(3), GeoErrorCode::Timeout);
        assert_eq!(GeoErrorCode::from_code(9), GeoErrorCode::PositionUnavailable);
        assert_eq!(GeoErrorCode::Timeout.code(), 3);
    }
}
