//! One live map view.
//!
//! [`MapSession`] owns every piece of mutable map state: visibility, the
//! latest local fix, the last polled set, the publish throttle and the
//! marker reconciler. [`MapSession::start`] moves it into a task fed by a
//! single event channel; [`SessionHandle::stop`] tears it down, and so does
//! dropping the handle. Work that finishes after teardown (a slow write, a
//! late poll) reports into a closed channel and is dropped.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::PresenceStore;
use crate::config::MapConfig;
use crate::error::ShopError;
use crate::events::{Event, GeoErrorCode, LocationUpdate};
use crate::feeds::{poller, LocationFeed, WatchOptions};
use crate::map::{desired_markers, MapSurface, MarkerReconciler};
use crate::shop::{self, catalog, PurchaseOutcome};
use crate::state::{GeoPoint, PresenceRecord, Position, Profile, PublishThrottle, UserId};

/// Where the map starts before the first fix.
pub const DEFAULT_CENTER: GeoPoint = GeoPoint {
    latitude: 51.505,
    longitude: -0.09,
};
pub const DEFAULT_ZOOM: u8 = 13;

/// Zoom used when flying to the user's own position.
pub const FOLLOW_ZOOM: u8 = 16;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Aborts the task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl AbortOnDrop {
    fn is_running(&self) -> bool {
        !self.0.is_finished()
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// What the UI chrome around the map shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Ghost mode on
    pub hidden: bool,
    /// We have a fix for ourselves ("Locating..." otherwise)
    pub located: bool,
    /// A location write went out within the last indicator period
    pub broadcasting: bool,
    /// Size of the last polled set
    pub active_nearby: usize,
    pub markers: usize,
}

pub struct MapSession<S: PresenceStore + 'static, M: MapSurface> {
    config: MapConfig,
    watch_options: WatchOptions,
    store: Arc<S>,
    profile: Profile,
    hidden: bool,
    fix: Option<Position>,
    others: Vec<PresenceRecord>,
    throttle: PublishThrottle,
    broadcast_until: Option<Instant>,
    has_centered: bool,
    reconciler: MarkerReconciler<M>,
    /// Latest ghost-mode flag for the writer task, set once started
    ghost_flag: Option<watch::Sender<bool>>,
}

impl<S: PresenceStore + 'static, M: MapSurface> MapSession<S, M> {
    /// Visibility starts from the profile's stored ghost-mode flag.
    pub fn new(config: MapConfig, store: Arc<S>, profile: Profile, surface: M) -> Self {
        Self {
            throttle: PublishThrottle::new(config.publish_interval()),
            config,
            watch_options: WatchOptions::default(),
            store,
            hidden: profile.is_hidden,
            profile,
            fix: None,
            others: Vec::new(),
            broadcast_until: None,
            has_centered: false,
            reconciler: MarkerReconciler::new(surface),
            ghost_flag: None,
        }
    }

    pub fn with_watch_options(mut self, options: WatchOptions) -> Self {
        self.watch_options = options;
        self
    }

    /// Start polling and, unless hidden, watching the device position.
    pub fn start<F: LocationFeed>(mut self, feed: F) -> SessionHandle<S> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(self.status());

        let (ghost_tx, ghost_rx) = watch::channel(self.hidden);
        spawn_ghost_writer(
            Arc::clone(&self.store),
            self.profile.id.clone(),
            ghost_rx,
            tx.clone(),
        );
        self.ghost_flag = Some(ghost_tx);

        let poller = poller::spawn(
            Arc::clone(&self.store),
            self.config.presence_policy(),
            self.config.poll_interval(),
            tx.clone(),
        );
        let store = Arc::clone(&self.store);
        let user_id = self.profile.id.clone();
        let task = tokio::spawn(self.run(feed, tx.clone(), rx, status_tx));

        SessionHandle {
            tx,
            task,
            poller,
            store,
            user_id,
            status: status_rx,
        }
    }

    async fn run<F: LocationFeed>(
        mut self,
        feed: F,
        tx: mpsc::Sender<Event>,
        mut rx: mpsc::Receiver<Event>,
        status: watch::Sender<SessionStatus>,
    ) {
        self.reconciler.surface_mut().set_view(DEFAULT_CENTER, DEFAULT_ZOOM);
        let mut location_watch = None;
        if !self.hidden {
            location_watch = Some(AbortOnDrop(feed.spawn(self.watch_options, tx.clone())));
        }
        info!(user = %self.profile.id, hidden = self.hidden, "map session started");

        loop {
            let flush_at = self.throttle.next_flush();
            let broadcast_off = self.broadcast_until;

            let dirty = tokio::select! {
                event = rx.recv() => match event {
                    None | Some(Event::Shutdown) => break,
                    Some(event) => self.handle(event, &feed, &tx, &mut location_watch),
                },
                _ = wait_until(flush_at) => {
                    if let Some(position) = self.throttle.flush(Instant::now()) {
                        self.publish(position);
                    }
                    false
                }
                _ = wait_until(broadcast_off) => {
                    self.broadcast_until = None;
                    false
                }
            };

            if dirty {
                self.reconcile();
            }
            status.send_replace(self.status());
        }

        drop(location_watch);
        let removed = self.reconciler.clear();
        status.send_replace(self.status());
        info!(removed, "map session stopped");
    }

    /// Apply one event. Returns true if the marker set may have changed.
    fn handle<F: LocationFeed>(
        &mut self,
        event: Event,
        feed: &F,
        tx: &mpsc::Sender<Event>,
        location_watch: &mut Option<AbortOnDrop>,
    ) -> bool {
        match event {
            Event::Location(LocationUpdate::Fix(position)) => self.on_fix(position),
            Event::Location(LocationUpdate::Error { code, message }) => {
                warn!(code = code.code(), %message, "geo watch error");
                if code != GeoErrorCode::PermissionDenied || self.hidden {
                    return false;
                }
                // Only transition the watch drives on its own
                self.go_hidden(location_watch);
                self.write_hidden(true);
                true
            }
            Event::Presence(records) => {
                self.others = records;
                true
            }
            Event::SetHidden(hidden) => {
                if hidden {
                    self.go_hidden(location_watch);
                } else {
                    self.go_live(feed, tx, location_watch);
                }
                self.write_hidden(hidden);
                true
            }
            Event::RefreshProfile => {
                self.refresh_profile(tx);
                false
            }
            Event::ProfileLoaded(profile) => {
                if profile.id != self.profile.id {
                    warn!(expected = %self.profile.id, got = %profile.id, "ignoring foreign profile");
                    return false;
                }
                self.profile = profile;
                true
            }
            Event::Shutdown => false,
        }
    }

    fn on_fix(&mut self, position: Position) -> bool {
        if self.hidden {
            debug!("ignoring fix while hidden");
            return false;
        }

        self.fix = Some(position);
        if let Some(accepted) = self.throttle.offer(position, Instant::now()) {
            self.publish(accepted);
        }

        if !self.has_centered {
            self.reconciler.surface_mut().fly_to(position.point, FOLLOW_ZOOM);
            self.has_centered = true;
        }
        true
    }

    fn go_hidden(&mut self, location_watch: &mut Option<AbortOnDrop>) {
        self.hidden = true;
        self.fix = None;
        self.throttle.reset();
        self.broadcast_until = None;
        // Dropping the guard stops the watch
        *location_watch = None;
        info!("ghost mode on");
    }

    fn go_live<F: LocationFeed>(
        &mut self,
        feed: &F,
        tx: &mpsc::Sender<Event>,
        location_watch: &mut Option<AbortOnDrop>,
    ) {
        self.hidden = false;
        // Fly to the user again once the next fix comes in
        self.has_centered = false;

        let running = location_watch.as_ref().is_some_and(AbortOnDrop::is_running);
        if !running {
            *location_watch = Some(AbortOnDrop(feed.spawn(self.watch_options, tx.clone())));
        }
        info!("live");
    }

    /// Write one location in the background and raise the indicator.
    ///
    /// The row is stamped with our clock at write time, not the device's
    /// capture time, so a device clock running ahead can't keep a user fresh.
    fn publish(&mut self, position: Position) {
        self.broadcast_until = Some(Instant::now() + self.config.broadcast_indicator());

        let store = Arc::clone(&self.store);
        let user_id = self.profile.id.clone();
        tokio::spawn(async move {
            match store
                .update_location(&user_id, position.point, Utc::now())
                .await
            {
                Ok(()) => debug!(
                    lat = position.point.latitude,
                    lng = position.point.longitude,
                    "location published"
                ),
                // Next accepted fix tries again
                Err(e) => warn!(error = %e, "location publish failed"),
            }
        });
    }

    /// Hand the flag to the ghost writer. Only the latest value matters.
    fn write_hidden(&self, hidden: bool) {
        if let Some(flag) = &self.ghost_flag {
            flag.send_replace(hidden);
        }
    }

    fn refresh_profile(&self, tx: &mpsc::Sender<Event>) {
        let store = Arc::clone(&self.store);
        let user_id = self.profile.id.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match store.fetch_profile(&user_id).await {
                // Session may be gone by now; then this just drops
                Ok(profile) => {
                    let _ = tx.send(Event::ProfileLoaded(profile)).await;
                }
                Err(e) => warn!(error = %e, "profile refresh failed"),
            }
        });
    }

    fn reconcile(&mut self) {
        let fix = if self.hidden {
            None
        } else {
            self.fix.map(|position| position.point)
        };
        let desired = desired_markers(&self.profile, fix, &self.others);
        self.reconciler.apply(&desired);
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            hidden: self.hidden,
            located: self.fix.is_some(),
            broadcasting: !self.hidden && self.broadcast_until.is_some(),
            active_nearby: self.others.len(),
            markers: self.reconciler.len(),
        }
    }
}

/// Writes ghost-mode flags one at a time, always the most recent one.
///
/// Toggles that arrive while a write is in flight collapse into a single
/// follow-up write, so an older flag can never land after a newer one.
/// Ends once the session drops its sender.
fn spawn_ghost_writer<S: PresenceStore + 'static>(
    store: Arc<S>,
    user_id: UserId,
    mut flag: watch::Receiver<bool>,
    tx: mpsc::Sender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while flag.changed().await.is_ok() {
            let hidden = *flag.borrow_and_update();
            if let Err(e) = store.set_hidden(&user_id, hidden).await {
                warn!(error = %e, hidden, "failed to store ghost mode");
            }
            let _ = tx.send(Event::RefreshProfile).await;
        }
        debug!("ghost writer done");
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Control side of a running session. Dropping it without [`stop`](Self::stop)
/// still ends the session, but leaves its markers on the surface.
pub struct SessionHandle<S: PresenceStore + 'static> {
    tx: mpsc::Sender<Event>,
    task: JoinHandle<()>,
    poller: JoinHandle<()>,
    store: Arc<S>,
    user_id: UserId,
    status: watch::Receiver<SessionStatus>,
}

impl<S: PresenceStore + 'static> SessionHandle<S> {
    /// Toggle ghost mode. Returns false if the session is gone.
    pub async fn set_hidden(&self, hidden: bool) -> bool {
        self.tx.send(Event::SetHidden(hidden)).await.is_ok()
    }

    /// Re-read the profile (e.g. after it was edited elsewhere).
    pub async fn refresh_profile(&self) -> bool {
        self.tx.send(Event::RefreshProfile).await.is_ok()
    }

    /// Buy or equip a pin, then restyle our marker from the stored profile.
    pub async fn purchase_or_equip(&self, style_id: &str) -> Result<PurchaseOutcome, ShopError> {
        let style = catalog::find(style_id)
            .ok_or_else(|| ShopError::UnknownStyle(style_id.to_string()))?;
        let outcome = shop::purchase_or_equip(self.store.as_ref(), &self.user_id, style).await?;
        let _ = self.tx.send(Event::RefreshProfile).await;
        Ok(outcome)
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop polling and watching, remove every marker, and wait for the session to end.
    pub async fn stop(mut self) {
        self.poller.abort();
        let _ = self.tx.send(Event::Shutdown).await;
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "map session task failed");
        }
        info!(user = %self.user_id, time = %Utc::now().format("%H:%M:%S"), "map view closed");
    }
}

impl<S: PresenceStore + 'static> Drop for SessionHandle<S> {
    fn drop(&mut self) {
        self.poller.abort();
        self.task.abort();
    }
}
