use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{LocationFeed, WatchOptions};
use crate::error::FeedError;
use crate::events::{Event, GeoErrorCode, LocationUpdate};
use crate::state::Position;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// What we send once connected
#[derive(serde::Serialize)]
struct WatchRequest {
    operation: &'static str,
    enable_high_accuracy: bool,
    maximum_age: u64,
    timeout: u64,
}

impl From<&WatchOptions> for WatchRequest {
    fn from(options: &WatchOptions) -> Self {
        Self {
            operation: "watch",
            enable_high_accuracy: options.high_accuracy,
            maximum_age: options.maximum_age.as_millis() as u64,
            timeout: options.timeout.as_millis() as u64,
        }
    }
}

// The bridge sends one of these per frame
#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Position {
        latitude: f64,
        longitude: f64,
        /// Unix millis of the reading
        timestamp: Option<i64>,
    },
    Error {
        code: u8,
        message: Option<String>,
    },
}

/// Why a single connection stopped.
#[derive(Debug, PartialEq, Eq)]
enum WatchEnd {
    Closed,
    Denied,
    SessionGone,
}

/// Decode one bridge frame. `Ok(None)` means the frame is valid but unusable
/// (reading too old, dated too far ahead, or off the globe).
fn parse_frame(
    text: String,
    options: &WatchOptions,
    now: DateTime<Utc>,
) -> Result<Option<LocationUpdate>, FeedError> {
    let mut bytes = text.into_bytes();
    let frame = simd_json::from_slice::<BridgeFrame>(&mut bytes)?;

    match frame {
        BridgeFrame::Position {
            latitude,
            longitude,
            timestamp,
        } => {
            let captured_at = timestamp
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .unwrap_or(now);
            let position = Position::new(latitude, longitude, captured_at);

            if !position.point.is_valid() {
                debug!(latitude, longitude, "dropping invalid fix");
                return Ok(None);
            }

            let max_age = chrono::Duration::from_std(options.maximum_age)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if position.age(now) > max_age {
                debug!(age_ms = position.age(now).num_milliseconds(), "dropping stale fix");
                return Ok(None);
            }
            // Device clock ahead of ours by more than we'd accept as cache age
            if captured_at - now > max_age {
                debug!(ahead_ms = (captured_at - now).num_milliseconds(), "dropping future-dated fix");
                return Ok(None);
            }

            Ok(Some(LocationUpdate::Fix(position)))
        }
        BridgeFrame::Error { code, message } => Ok(Some(LocationUpdate::Error {
            code: GeoErrorCode::from_code(code),
            message: message.unwrap_or_default(),
        })),
    }
}

/// Location watch backed by a websocket the native shell exposes.
#[derive(Debug, Clone)]
pub struct DeviceBridgeFeed {
    url: String,
    reconnect_delay: Duration,
}

impl DeviceBridgeFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    async fn watch(
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        options: WatchOptions,
        tx: &mpsc::Sender<Event>,
    ) -> Result<WatchEnd, FeedError> {
        let (mut write, mut read) = ws_stream.split();

        let request = serde_json::to_string(&WatchRequest::from(&options))?;
        write.send(tungstenite::Message::Text(request)).await?;
        info!(
            high_accuracy = options.high_accuracy,
            maximum_age_ms = options.maximum_age.as_millis() as u64,
            "watching position"
        );

        loop {
            let msg = match tokio::time::timeout(options.timeout, read.next()).await {
                // Stalled. Report it and keep listening.
                Err(_) => {
                    warn!(timeout_ms = options.timeout.as_millis() as u64, "no position update");
                    let update = LocationUpdate::Error {
                        code: GeoErrorCode::Timeout,
                        message: "position watch timed out".to_string(),
                    };
                    if tx.send(Event::Location(update)).await.is_err() {
                        return Ok(WatchEnd::SessionGone);
                    }
                    continue;
                }
                Ok(None) => return Ok(WatchEnd::Closed),
                Ok(Some(msg)) => msg?,
            };

            match msg {
                tungstenite::Message::Text(text) => match parse_frame(text, &options, Utc::now()) {
                    Ok(Some(update)) => {
                        let denied = matches!(
                            update,
                            LocationUpdate::Error { code: GeoErrorCode::PermissionDenied, .. }
                        );
                        if tx.send(Event::Location(update)).await.is_err() {
                            return Ok(WatchEnd::SessionGone);
                        }
                        if denied {
                            return Ok(WatchEnd::Denied);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "skipping malformed bridge frame"),
                },
                tungstenite::Message::Close(_) => return Ok(WatchEnd::Closed),
                _ => {}
            }
        }
    }
}

impl LocationFeed for DeviceBridgeFeed {
    fn spawn(&self, options: WatchOptions, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        let url = self.url.clone();
        let reconnect_delay = self.reconnect_delay;

        tokio::spawn(async move {
            loop {
                info!(url = %url, "connecting to location bridge");

                match connect_async(url.as_str()).await {
                    Ok((ws_stream, _)) => match Self::watch(ws_stream, options, &tx).await {
                        Ok(WatchEnd::Denied) => {
                            warn!("location permission denied, watch stopped");
                            return;
                        }
                        Ok(WatchEnd::SessionGone) => return,
                        Ok(WatchEnd::Closed) => warn!("location bridge closed"),
                        Err(e) => warn!(error = %e, "location bridge error"),
                    },
                    Err(e) => warn!(error = %e, "failed to connect to location bridge"),
                }

                if tx.is_closed() {
                    return;
                }
                info!(delay_ms = reconnect_delay.as_millis() as u64, "reconnecting to location bridge");
                tokio::time::sleep(reconnect_delay).await;
            }
        })
    }
}
