use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::api::PresenceStore;
use crate::events::Event;
use crate::state::{visible_set, PresencePolicy};

/// Spawns a task that fetches the visible set every `interval` and sends
/// `Presence` events. First fetch happens immediately.
///
/// A failed fetch sends nothing, so the session keeps its previous set.
/// The task ends on its own once the session stops listening.
pub fn spawn<S>(
    store: Arc<S>,
    policy: PresencePolicy,
    interval: Duration,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()>
where
    S: PresenceStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match store.list_visible_users(Utc::now()).await {
                Ok(records) => {
                    // Re-check on our side, the store may not filter
                    let visible = visible_set(records, Utc::now(), &policy);
                    debug!(count = visible.len(), "presence poll");
                    if tx.send(Event::Presence(visible)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "error fetching live users");
                    if tx.is_closed() {
                        break;
                    }
                }
            }
        }
    })
}
