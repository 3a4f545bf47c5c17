use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::GeoPoint;

/// Default freshness window for presence records.
pub const PRESENCE_WINDOW_SECS: i64 = 15 * 60;

/// Default cap on how many records one poll returns.
pub const MAX_VISIBLE: usize = 50;

/// Store-side user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Someone else's last published location, as the store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: String,
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
    pub is_hidden: bool,
    pub pin_style_id: String,
    pub is_verified: bool,
}

impl PresenceRecord {
    /// Visible and published within `max_age` of `now` (boundary inclusive).
    pub fn is_eligible(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        !self.is_hidden && now - self.updated_at <= max_age
    }
}

/// Which records make it onto the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresencePolicy {
    pub max_age: chrono::Duration,
    pub limit: usize,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self {
            max_age: chrono::Duration::seconds(PRESENCE_WINDOW_SECS),
            limit: MAX_VISIBLE,
        }
    }
}

impl PresencePolicy {
    /// Oldest `updated_at` that still qualifies.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.max_age
    }
}

/// Drop hidden and stale records, then cap. Order of the survivors is preserved.
pub fn visible_set(
    records: Vec<PresenceRecord>,
    now: DateTime<Utc>,
    policy: &PresencePolicy,
) -> Vec<PresenceRecord> {
    records
        .into_iter()
        .filter(|r| r.is_eligible(now, policy.max_age))
        .take(policy.limit)
        .collect()
}

#[cfg(test)]
pub(crate) fn record(id: &str, lat: f64, lng: f64, updated_at: DateTime<Utc>) -> PresenceRecord {
    PresenceRecord {
        user_id: UserId::new(id),
        username: id.to_string(),
        avatar_url: format!("https://picsum.photos/seed/{id}/100"),
        point: GeoPoint::new(lat, lng),
        updated_at,
        is_hidden: false,
        pin_style_id: "default".to_string(),
        is_verified: false,
    }
}
