use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsm_presence::feeds::DeviceBridgeFeed;
use rsm_presence::map::TracingSurface;
use rsm_presence::state::UserId;
use rsm_presence::{Config, MapSession, PresenceStore, RestStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load("config.toml")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cfg.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(backend = %cfg.backend.url, "loaded config");

    let store = Arc::new(
        RestStore::new(&cfg.backend.url, &cfg.backend.anon_key, &cfg.backend.access_token)
            .with_policy(cfg.map.presence_policy()),
    );

    let user_id = UserId::new(&cfg.backend.user_id);
    let profile = store.fetch_profile(&user_id).await?;
    info!(
        user = %profile.username,
        hidden = profile.is_hidden,
        balance = profile.wardrobe.balance,
        pin = %profile.wardrobe.equipped,
        "signed in"
    );

    let feed = DeviceBridgeFeed::new(&cfg.location.bridge_url);
    let session = MapSession::new(cfg.map.clone(), store, profile, TracingSurface)
        .with_watch_options(cfg.location.watch_options());
    let handle = session.start(feed);

    let mut status = handle.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let s = *status.borrow_and_update();
            info!(
                hidden = s.hidden,
                located = s.located,
                broadcasting = s.broadcasting,
                active_nearby = s.active_nearby,
                markers = s.markers,
                "status"
            );
        }
    });

    info!("map running (Ctrl+C to quit)");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
    }

    info!("shutting down...");
    handle.stop().await;
    Ok(())
}
