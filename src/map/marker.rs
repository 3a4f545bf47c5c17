use tracing::info;

use crate::state::{GeoPoint, UserId};

/// Stacking priority for the local user's pin. Everyone else sits at 0.
pub const SELF_Z_PRIORITY: i32 = 1000;

/// One pin on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub owner_id: UserId,
    pub point: GeoPoint,
    /// Pin style id, already resolved against the catalog
    pub style_id: &'static str,
    /// Username shown under the pin
    pub label: String,
    pub avatar_url: String,
    pub is_self: bool,
    pub z_priority: i32,
}

/// What a rendering backend has to offer for the map to work.
///
/// `upsert_marker` creates the pin if the owner has none yet, otherwise
/// moves and restyles the existing one.
pub trait MapSurface: Send + 'static {
    /// Jump to a view without animation.
    fn set_view(&mut self, center: GeoPoint, zoom: u8);

    /// Animate to a view.
    fn fly_to(&mut self, center: GeoPoint, zoom: u8);

    fn upsert_marker(&mut self, marker: &MapMarker);

    fn remove_marker(&mut self, owner_id: &UserId);
}

/// Surface that just logs every call. Used by the binaries.
#[derive(Debug, Default)]
pub struct TracingSurface;

impl MapSurface for TracingSurface {
    fn set_view(&mut self, center: GeoPoint, zoom: u8) {
        info!(lat = center.latitude, lng = center.longitude, zoom, "set view");
    }

    fn fly_to(&mut self, center: GeoPoint, zoom: u8) {
        info!(lat = center.latitude, lng = center.longitude, zoom, "fly to");
    }

    fn upsert_marker(&mut self, marker: &MapMarker) {
        info!(
            owner = %marker.owner_id,
            label = %marker.label,
            lat = marker.point.latitude,
            lng = marker.point.longitude,
            style = marker.style_id,
            is_self = marker.is_self,
            "upsert marker"
        );
    }

    fn remove_marker(&mut self, owner_id: &UserId) {
        info!(owner = %owner_id, "remove marker");
    }
}
