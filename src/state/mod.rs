mod position;
mod presence;
mod profile;
mod throttle;

pub use position::{GeoPoint, Position};
pub use presence::{visible_set, PresencePolicy, PresenceRecord, UserId, MAX_VISIBLE, PRESENCE_WINDOW_SECS};
pub use profile::{Profile, Wardrobe, DEFAULT_PIN};
pub use throttle::PublishThrottle;

#[cfg(test)]
pub(crate) use presence::record;
