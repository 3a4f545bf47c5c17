use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::feeds::WatchOptions;
use crate::state::{PresencePolicy, MAX_VISIBLE, PRESENCE_WINDOW_SECS};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub backend: Backend,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub map: MapConfig,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

/// Hosted profile store.
#[derive(Debug, Deserialize)]
pub struct Backend {
    pub url: String,
    /// Project API key (sent as `apikey`). `RSM_ANON_KEY` overrides it.
    #[serde(default)]
    pub anon_key: String,
    /// Signed-in user's token. `RSM_ACCESS_TOKEN` overrides it.
    #[serde(default)]
    pub access_token: String,
    pub user_id: String,
}

/// Device location bridge and watch settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Location {
    pub bridge_url: String,
    pub high_accuracy: bool,
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            bridge_url: "ws://127.0.0.1:8765/location".to_string(),
            high_accuracy: true,
            maximum_age_ms: 5_000,
            timeout_ms: 20_000,
        }
    }
}

impl Location {
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            maximum_age: Duration::from_millis(self.maximum_age_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Map session timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Minimum gap between two location writes
    pub publish_interval_ms: u64,
    /// How often other users are fetched
    pub poll_interval_ms: u64,
    /// Records older than this are not shown
    pub presence_window_secs: i64,
    pub max_visible: usize,
    /// How long the "sending" indicator stays up per write
    pub broadcast_indicator_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 5_000,
            poll_interval_ms: 5_000,
            presence_window_secs: PRESENCE_WINDOW_SECS,
            max_visible: MAX_VISIBLE,
            broadcast_indicator_ms: 1_000,
        }
    }
}

impl MapConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn broadcast_indicator(&self) -> Duration {
        Duration::from_millis(self.broadcast_indicator_ms)
    }

    pub fn presence_policy(&self) -> PresencePolicy {
        PresencePolicy {
            max_age: chrono::Duration::seconds(self.presence_window_secs),
            limit: self.max_visible,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;

        dotenvy::dotenv().ok();
        if let Ok(key) = std::env::var("RSM_ANON_KEY") {
            config.backend.anon_key = key;
        }
        if let Ok(token) = std::env::var("RSM_ACCESS_TOKEN") {
            config.backend.access_token = token;
        }

        if config.backend.access_token.is_empty() {
            anyhow::bail!("no access token: set backend.access_token or RSM_ACCESS_TOKEN");
        }
        Ok(config)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [general]
        log_level = "debug"

        [backend]
        url = "https://abc.supabase.co"
        anon_key = "anon"
        access_token = "token"
        user_id = "6a1f"
    "#;

    #[test]
    fn test_minimal_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.backend.user_id, "6a1f");
        assert_eq!(config.map, MapConfig::default());
        assert_eq!(config.location.watch_options(), WatchOptions::default());
    }

    #[test]
    fn test_map_defaults() {
        let map = MapConfig::default();
        assert_eq!(map.publish_interval(), Duration::from_secs(5));
        assert_eq!(map.poll_interval(), Duration::from_secs(5));
        assert_eq!(map.broadcast_indicator(), Duration::from_secs(1));
        assert_eq!(map.presence_policy(), PresencePolicy::default());
    }

    #[test]
    fn test_partial_override() {
        let toml = format!("{MINIMAL}\n[map]\npoll_interval_ms = 2000\n\n[location]\ntimeout_ms = 10000\n");
        let config = Config::parse(&toml).unwrap();

        assert_eq!(config.map.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.map.publish_interval(), Duration::from_secs(5));
        assert_eq!(config.location.watch_options().timeout, Duration::from_secs(10));
        assert!(config.location.high_accuracy);
    }

    #[test]
    fn test_missing_backend_fails() {
        assert!(Config::parse("[general]\nlog_level = \"info\"\n").is_err());
    }
}
