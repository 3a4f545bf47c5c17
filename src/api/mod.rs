pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::state::{GeoPoint, PresenceRecord, Profile, UserId, Wardrobe};

pub use memory::MemoryStore;
pub use rest::RestStore;

/// The hosted profile table, seen from the map.
///
/// Implementations own transport and filtering; callers treat every
/// method as a single remote round trip that may fail.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Overwrite the caller's published location.
    async fn update_location(
        &self,
        user_id: &UserId,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Flip the caller's ghost-mode flag.
    async fn set_hidden(&self, user_id: &UserId, hidden: bool) -> Result<(), StoreError>;

    /// Everyone who is not hidden and published within the presence
    /// window before `now`, at most [`crate::state::MAX_VISIBLE`] records.
    async fn list_visible_users(&self, now: DateTime<Utc>) -> Result<Vec<PresenceRecord>, StoreError>;

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Profile, StoreError>;

    /// Equip an already owned style. Balance is untouched.
    async fn set_equipped(&self, user_id: &UserId, style_id: &str) -> Result<(), StoreError>;

    /// Replace the wardrobe in one write, only if the stored balance still
    /// equals `expected_balance`. Returns false when the guard failed.
    async fn commit_purchase(
        &self,
        user_id: &UserId,
        expected_balance: u64,
        next: &Wardrobe,
    ) -> Result<bool, StoreError>;
}
