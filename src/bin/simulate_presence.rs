//! Runs a map session against an in-memory store with a few fake users
//! walking around London. No backend or device needed.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsm_presence::config::MapConfig;
use rsm_presence::events::{Event, LocationUpdate};
use rsm_presence::feeds::{LocationFeed, WatchOptions};
use rsm_presence::map::TracingSurface;
use rsm_presence::shop::shop_listing;
use rsm_presence::state::{GeoPoint, Position, Profile, UserId};
use rsm_presence::{MapSession, MemoryStore, PresenceStore};

const WALKERS: [(&str, f64, f64, &str); 3] = [
    ("maya", 51.507, -0.127, "golden"),
    ("theo", 51.503, -0.119, "cyber"),
    ("ines", 51.510, -0.134, "coachella"),
];

/// Fake device: a fix every second, drifting north-east.
struct WalkFeed {
    start: GeoPoint,
}

impl LocationFeed for WalkFeed {
    fn spawn(&self, _options: WatchOptions, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        let start = self.start;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            let mut step = 0.0;
            loop {
                ticker.tick().await;
                let position = Position::new(start.latitude + step, start.longitude + step, Utc::now());
                if tx.send(Event::Location(LocationUpdate::Fix(position))).await.is_err() {
                    return;
                }
                step += 0.0001;
            }
        })
    }
}

async fn seed(store: &MemoryStore) -> anyhow::Result<Profile> {
    for (name, lat, lng, pin) in WALKERS {
        let mut profile = Profile::new(UserId::new(name), name);
        profile.is_hidden = false;
        profile.wardrobe.unlocked.push(pin.to_string());
        profile.wardrobe.equipped = pin.to_string();
        store.insert_profile(profile).await;
        store
            .update_location(&UserId::new(name), GeoPoint::new(lat, lng), Utc::now())
            .await?;
    }

    let mut me = Profile::new(UserId::new("me"), "me");
    me.is_hidden = false;
    me.wardrobe.balance = 1200;
    store.insert_profile(me.clone()).await;
    Ok(me)
}

/// Moves every walker a little every few seconds.
fn spawn_walkers(store: Arc<MemoryStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3));
        let mut step = 0.0;
        loop {
            ticker.tick().await;
            step += 0.0002;
            for (name, lat, lng, _) in WALKERS {
                let point = GeoPoint::new(lat - step, lng + step);
                if let Err(e) = store.update_location(&UserId::new(name), point, Utc::now()).await {
                    warn!(error = %e, walker = name, "walker update failed");
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(MemoryStore::new());
    let me = seed(&store).await?;

    for (style, availability) in shop_listing(&me) {
        info!(style = style.id, price = style.price, ?availability, "shop");
    }

    let walkers = spawn_walkers(Arc::clone(&store));
    let feed = WalkFeed {
        start: GeoPoint::new(51.505, -0.09),
    };
    let handle = MapSession::new(MapConfig::default(), Arc::clone(&store), me, TracingSurface).start(feed);
    let status = handle.status();

    tokio::time::sleep(Duration::from_secs(12)).await;
    match handle.purchase_or_equip("neon_pink").await {
        Ok(outcome) => info!(?outcome, "shop"),
        Err(e) => warn!(error = %e, "purchase failed"),
    }

    tokio::time::sleep(Duration::from_secs(6)).await;
    info!("going ghost");
    handle.set_hidden(true).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    info!("going live");
    handle.set_hidden(false).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    let s = *status.borrow();
    println!(
        "\nhidden={} located={} active_nearby={} markers={}",
        s.hidden, s.located, s.active_nearby, s.markers
    );

    walkers.abort();
    handle.stop().await;
    Ok(())
}
