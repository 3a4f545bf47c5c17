pub mod device;
pub mod poller;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::Event;

pub use device::DeviceBridgeFeed;

/// How the device should report positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Oldest cached reading we accept
    pub maximum_age: Duration,
    /// Silence longer than this is reported as a timeout
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::from_secs(5),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Something that can start a continuous location watch.
///
/// Every call starts a fresh watch that sends `Event::Location` into `tx`
/// until the returned task is aborted. A watch is never resumed; the
/// session spawns a new one when the user goes live again.
pub trait LocationFeed: Send + Sync + 'static {
    fn spawn(&self, options: WatchOptions, tx: mpsc::Sender<Event>) -> JoinHandle<()>;
}
