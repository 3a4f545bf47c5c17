use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PresenceStore;
use crate::error::StoreError;
use crate::state::{
    GeoPoint, PresencePolicy, PresenceRecord, Profile, UserId, Wardrobe, DEFAULT_PIN,
};

const PROFILES_PATH: &str = "/rest/v1/profiles";

/// Row of the hosted `profiles` table. Every column may be null.
#[derive(Debug, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub gems: Option<i64>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub is_ghost_mode: Option<bool>,
    pub current_pin_style: Option<String>,
    pub unlocked_pins: Option<Vec<String>>,
    pub is_verified: Option<bool>,
}

impl ProfileRow {
    fn avatar(&self) -> String {
        self.avatar_url
            .clone()
            .unwrap_or_else(|| format!("https://picsum.photos/seed/{}/100", self.id))
    }

    /// Presence view of the row. None if the user never published a location.
    pub fn into_presence(self) -> Option<PresenceRecord> {
        let point = GeoPoint::new(self.location_lat?, self.location_lng?);
        let updated_at = self.location_updated_at?;
        let avatar_url = self.avatar();

        Some(PresenceRecord {
            user_id: UserId(self.id),
            username: self.username.unwrap_or_else(|| "User".to_string()),
            avatar_url,
            point,
            updated_at,
            // No flag means we were never told it's ok to show them
            is_hidden: self.is_ghost_mode.unwrap_or(true),
            pin_style_id: self.current_pin_style.unwrap_or_else(|| DEFAULT_PIN.to_string()),
            is_verified: self.is_verified.unwrap_or(false),
        })
    }

    pub fn into_profile(self) -> Profile {
        let avatar_url = self.avatar();
        let wardrobe = Wardrobe {
            balance: self.gems.unwrap_or(0).max(0) as u64,
            unlocked: self
                .unlocked_pins
                .unwrap_or_else(|| vec![DEFAULT_PIN.to_string()]),
            equipped: self
                .current_pin_style
                .unwrap_or_else(|| DEFAULT_PIN.to_string()),
        };

        Profile {
            id: UserId(self.id),
            username: self.username.unwrap_or_else(|| "User".to_string()),
            avatar_url,
            is_hidden: self.is_ghost_mode.unwrap_or(true),
            is_verified: self.is_verified.unwrap_or(false),
            wardrobe,
        }
    }
}

#[derive(Serialize)]
struct LocationPatch {
    location_lat: f64,
    location_lng: f64,
    location_updated_at: String,
}

#[derive(Serialize)]
struct GhostPatch {
    is_ghost_mode: bool,
}

#[derive(Serialize)]
struct EquipPatch<'a> {
    current_pin_style: &'a str,
}

#[derive(Serialize)]
struct WardrobePatch<'a> {
    gems: u64,
    unlocked_pins: &'a [String],
    current_pin_style: &'a str,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Client for a PostgREST-style hosted profile table.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: String,
    policy: PresencePolicy,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: access_token.into(),
            policy: PresencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PresencePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, PROFILES_PATH);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
    }

    fn own_row(&self, method: Method, user_id: &UserId) -> RequestBuilder {
        self.request(method)
            .query(&[("id", format!("eq.{}", user_id))])
    }

    /// Turn non-2xx into an error carrying the body (PostgREST puts details there).
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn rows(response: Response) -> Result<Vec<ProfileRow>, StoreError> {
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl PresenceStore for RestStore {
    async fn update_location(
        &self,
        user_id: &UserId,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let patch = LocationPatch {
            location_lat: point.latitude,
            location_lng: point.longitude,
            location_updated_at: timestamp(at),
        };
        let response = self.own_row(Method::PATCH, user_id).json(&patch).send().await?;
        Self::check(response).await?;
        debug!(user = %user_id, lat = point.latitude, lng = point.longitude, "location written");
        Ok(())
    }

    async fn set_hidden(&self, user_id: &UserId, hidden: bool) -> Result<(), StoreError> {
        let patch = GhostPatch { is_ghost_mode: hidden };
        let response = self.own_row(Method::PATCH, user_id).json(&patch).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_visible_users(&self, now: DateTime<Utc>) -> Result<Vec<PresenceRecord>, StoreError> {
        let cutoff = timestamp(self.policy.cutoff(now));
        let response = self
            .request(Method::GET)
            .query(&[
                ("select", "*".to_string()),
                ("is_ghost_mode", "eq.false".to_string()),
                ("location_lat", "not.is.null".to_string()),
                ("location_updated_at", format!("gte.{}", cutoff)),
                ("limit", self.policy.limit.to_string()),
            ])
            .send()
            .await?;

        let records: Vec<PresenceRecord> = Self::rows(response)
            .await?
            .into_iter()
            .filter_map(ProfileRow::into_presence)
            .collect();
        debug!(count = records.len(), "fetched live users");
        Ok(records)
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<Profile, StoreError> {
        let response = self
            .own_row(Method::GET, user_id)
            .query(&[("select", "*")])
            .send()
            .await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .map(ProfileRow::into_profile)
            .ok_or_else(|| StoreError::ProfileNotFound(user_id.to_string()))
    }

    async fn set_equipped(&self, user_id: &UserId, style_id: &str) -> Result<(), StoreError> {
        let patch = EquipPatch { current_pin_style: style_id };
        let response = self.own_row(Method::PATCH, user_id).json(&patch).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn commit_purchase(
        &self,
        user_id: &UserId,
        expected_balance: u64,
        next: &Wardrobe,
    ) -> Result<bool, StoreError> {
        let patch = WardrobePatch {
            gems: next.balance,
            unlocked_pins: &next.unlocked,
            current_pin_style: &next.equipped,
        };

        // The gems filter makes the update a compare-and-set: zero rows back means
        // someone else spent or earned in between.
        let response = self
            .own_row(Method::PATCH, user_id)
            .query(&[("gems", format!("eq.{}", expected_balance))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;

        Ok(!Self::rows(response).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = r#"{
        "id": "7f1c",
        "username": "maya",
        "avatar_url": null,
        "gems": 1200,
        "location_lat": 40.7128,
        "location_lng": -74.006,
        "location_updated_at": "2025-04-12T18:30:00.000Z",
        "is_ghost_mode": false,
        "current_pin_style": "neon_pink",
        "unlocked_pins": ["default", "neon_pink"],
        "is_verified": true
    }"#;

    fn row(json: &str) -> ProfileRow {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_row_to_presence() {
        let record = row(ROW).into_presence().unwrap();
        assert_eq!(record.user_id, UserId::new("7f1c"));
        assert_eq!(record.point, GeoPoint::new(40.7128, -74.006));
        assert_eq!(record.pin_style_id, "neon_pink");
        assert_eq!(record.avatar_url, "https://picsum.photos/seed/7f1c/100");
        assert!(!record.is_hidden);
        assert!(record.is_verified);
    }

    #[test]
    fn test_row_without_location_is_skipped() {
        let r = row(r#"{"id": "a", "location_lat": 1.0, "location_lng": null}"#);
        assert!(r.into_presence().is_none());

        let r = row(r#"{"id": "b", "location_lat": 1.0, "location_lng": 2.0}"#);
        assert!(r.into_presence().is_none()); // no timestamp
    }

    #[test]
    fn test_row_defaults() {
        let profile = row(r#"{"id": "bare"}"#).into_profile();
        assert_eq!(profile.username, "User");
        assert!(profile.is_hidden);
        assert_eq!(profile.wardrobe, Wardrobe::default());
    }

    #[test]
    fn test_row_to_profile() {
        let profile = row(ROW).into_profile();
        assert_eq!(profile.wardrobe.balance, 1200);
        assert_eq!(profile.wardrobe.equipped, "neon_pink");
        assert!(profile.wardrobe.owns("neon_pink"));
        assert!(!profile.is_hidden);
    }

    #[test]
    fn test_negative_gems_clamped() {
        let profile = row(r#"{"id": "x", "gems": -5}"#).into_profile();
        assert_eq!(profile.wardrobe.balance, 0);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let store = RestStore::new("https://abc.supabase.co/", "key", "token");
        assert_eq!(store.base_url, "https://abc.supabase.co");
    }

    #[test]
    fn test_timestamp_format() {
        let at = DateTime::parse_from_rfc3339("2025-04-12T18:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(timestamp(at), "2025-04-12T18:30:00.000Z");
    }
}
