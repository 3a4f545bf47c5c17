use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::PresenceStore;
use crate::error::StoreError;
use crate::state::{visible_set, GeoPoint, PresencePolicy, PresenceRecord, Profile, UserId, Wardrobe};

/// A profile row as the in-memory table keeps it.
#[derive(Debug, Clone)]
struct Row {
    profile: Profile,
    location: Option<(GeoPoint, DateTime<Utc>)>,
}

/// Profile table held in process. Filters client-side with the same
/// rules the hosted store applies server-side.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<UserId, Row>>,
    policy: PresencePolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: PresencePolicy) -> Self {
        Self {
            rows: Mutex::default(),
            policy,
        }
    }

    /// Add or replace a profile. Any published location is kept.
    pub async fn insert_profile(&self, profile: Profile) {
        let mut rows = self.rows.lock().await;
        let location = rows.get(&profile.id).and_then(|row| row.location);
        rows.insert(profile.id.clone(), Row { profile, location });
    }

    /// Last published location for a user, if any.
    pub async fn location_of(&self, user_id: &UserId) -> Option<(GeoPoint, DateTime<Utc>)> {
        self.rows.lock().await.get(user_id).and_then(|row| row.location)
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

fn not_found(user_id: &UserId) -> StoreError {
    StoreError::ProfileNotFound(user_id.to_string())
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn update_location(
        &self,
        user_id: &UserId,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(user_id).ok_or_else(|| not_found(user_id))?;
        row.location = Some((point, at));
        Ok(())
    }

    async fn set_hidden(&self, user_id: &UserId, hidden: bool) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(user_id).ok_or_else(|| not_found(user_id))?;
        row.profile.is_hidden = hidden;
        Ok(())
    }

    async fn list_visible_users(&self, now: DateTime<Utc>) -> Result<Vec<PresenceRecord>, StoreError> {
        let rows = self.rows.lock().await;

        let mut records: Vec<PresenceRecord> = rows
            .values()
            .filter_map(|row| {
                let (point, updated_at) = row.location?;
                let profile = &row.profile;
                Some(PresenceRecord {
                    user_id: profile.id.clone(),
                    username: profile.username.clone(),
                    avatar_url: profile.avatar_url.clone(),
                    point,
                    updated_at,
                    is_hidden: profile.is_hidden,
                    pin_style_id: profile.wardrobe.equipped.clone(),
                    is_verified: profile.is_verified,
                })
            })
            .collect();

        // HashMap order is arbitrary; keep results stable for callers
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Ok(visible_set(records, now, &self.policy))
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Profile, StoreError> {
        self.rows
            .lock()
            .await
            .get(user_id)
            .map(|row| row.profile.clone())
            .ok_or_else(|| not_found(user_id))
    }

    async fn set_equipped(&self, user_id: &UserId, style_id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(user_id).ok_or_else(|| not_found(user_id))?;
        row.profile.wardrobe.equipped = style_id.to_string();
        Ok(())
    }

    async fn commit_purchase(
        &self,
        user_id: &UserId,
        expected_balance: u64,
        next: &Wardrobe,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(user_id).ok_or_else(|| not_found(user_id))?;
        if row.profile.wardrobe.balance != expected_balance {
            return Ok(false);
        }
        row.profile.wardrobe = next.clone();
        Ok(true)
    }
}
