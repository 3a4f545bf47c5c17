use std::time::Duration;
use tokio::time::Instant;

use super::Position;

/// Gates presence writes to one per window.
///
/// A position offered while the gate is open is written right away and
/// closes the gate for `window`. Positions offered while it is closed
/// overwrite a single pending slot; when the window ends the pending one
/// (the freshest) is written and starts the next window.
///
/// This is deliberately not a drop-only gate. With one, a user who stops
/// moving right after a write would stay published at the older spot
/// until the next device update, which may never come. Nothing is queued:
/// at most one position waits, and going hidden discards it via [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct PublishThrottle {
    window: Duration,
    last_write: Option<Instant>,
    pending: Option<Position>,
}

impl PublishThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_write: None,
            pending: None,
        }
    }

    fn is_open(&self, now: Instant) -> bool {
        match self.last_write {
            Some(last) => now.duration_since(last) >= self.window,
            None => true,
        }
    }

    /// Offer a fresh position. Returns it back if it should be written now.
    pub fn offer(&mut self, position: Position, now: Instant) -> Option<Position> {
        if self.is_open(now) {
            self.last_write = Some(now);
            self.pending = None;
            Some(position)
        } else {
            self.pending = Some(position);
            None
        }
    }

    /// When the pending position becomes writable, if there is one.
    pub fn next_flush(&self) -> Option<Instant> {
        match (self.pending, self.last_write) {
            (Some(_), Some(last)) => Some(last + self.window),
            (Some(_), None) => Some(Instant::now()),
            _ => None,
        }
    }

    /// Take the pending position if its window has ended.
    pub fn flush(&mut self, now: Instant) -> Option<Position> {
        if self.pending.is_some() && self.is_open(now) {
            self.last_write = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget the pending position. The window itself keeps running.
    pub fn reset(&mut self) {
        self.pending = None;
    }
}
