use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{MapMarker, MapSurface, SELF_Z_PRIORITY};
use crate::shop::style_or_default;
use crate::state::{GeoPoint, PresenceRecord, Profile, UserId};

/// A single change to apply to the map.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    Create(MapMarker),
    Update(MapMarker),
    Remove(UserId),
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Build the markers that should be on the map right now.
///
/// `fix` is the local user's latest position, only passed while visible.
/// Our own id coming back from the poll is always dropped: the local fix
/// wins, and while hidden we are not drawn at all. Duplicate owners keep
/// their first entry.
pub fn desired_markers(me: &Profile, fix: Option<GeoPoint>, others: &[PresenceRecord]) -> Vec<MapMarker> {
    let mut seen: HashSet<&UserId> = HashSet::new();
    let mut desired = Vec::with_capacity(others.len() + 1);

    seen.insert(&me.id);
    if let Some(point) = fix {
        desired.push(MapMarker {
            owner_id: me.id.clone(),
            point,
            style_id: style_or_default(&me.wardrobe.equipped).id,
            label: me.username.clone(),
            avatar_url: me.avatar_url.clone(),
            is_self: true,
            z_priority: SELF_Z_PRIORITY,
        });
    }

    for record in others {
        if !seen.insert(&record.user_id) {
            continue;
        }
        desired.push(MapMarker {
            owner_id: record.user_id.clone(),
            point: record.point,
            style_id: style_or_default(&record.pin_style_id).id,
            label: record.username.clone(),
            avatar_url: record.avatar_url.clone(),
            is_self: false,
            z_priority: 0,
        });
    }

    desired
}

/// Sole owner of the map's markers.
///
/// Keeps its own view of what is on the surface and turns a desired set
/// into create/update/remove calls.
pub struct MarkerReconciler<M: MapSurface> {
    surface: M,
    markers: HashMap<UserId, MapMarker>,
}

impl<M: MapSurface> MarkerReconciler<M> {
    pub fn new(surface: M) -> Self {
        Self {
            surface,
            markers: HashMap::new(),
        }
    }

    /// Ops that would bring the surface to `desired`. Nothing is applied.
    pub fn plan(&self, desired: &[MapMarker]) -> Vec<MarkerOp> {
        let mut ops = Vec::with_capacity(desired.len());
        let wanted: HashSet<&UserId> = desired.iter().map(|m| &m.owner_id).collect();

        for marker in desired {
            if self.markers.contains_key(&marker.owner_id) {
                ops.push(MarkerOp::Update(marker.clone()));
            } else {
                ops.push(MarkerOp::Create(marker.clone()));
            }
        }

        for owner in self.markers.keys() {
            if !wanted.contains(owner) {
                ops.push(MarkerOp::Remove(owner.clone()));
            }
        }

        ops
    }

    /// Bring the surface in line with `desired`.
    pub fn apply(&mut self, desired: &[MapMarker]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        for op in self.plan(desired) {
            match op {
                MarkerOp::Create(marker) => {
                    self.surface.upsert_marker(&marker);
                    self.markers.insert(marker.owner_id.clone(), marker);
                    stats.created += 1;
                }
                MarkerOp::Update(marker) => {
                    self.surface.upsert_marker(&marker);
                    self.markers.insert(marker.owner_id.clone(), marker);
                    stats.updated += 1;
                }
                MarkerOp::Remove(owner) => {
                    self.surface.remove_marker(&owner);
                    self.markers.remove(&owner);
                    stats.removed += 1;
                }
            }
        }

        if stats.created > 0 || stats.removed > 0 {
            debug!(
                created = stats.created,
                updated = stats.updated,
                removed = stats.removed,
                "markers reconciled"
            );
        }
        stats
    }

    /// Remove every marker from the surface.
    pub fn clear(&mut self) -> usize {
        let removed = self.markers.len();
        for (owner, _) in self.markers.drain() {
            self.surface.remove_marker(&owner);
        }
        removed
    }

    pub fn get(&self, owner_id: &UserId) -> Option<&MapMarker> {
        self.markers.get(owner_id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Viewport control. Marker calls must go through [`Self::apply`].
    pub fn surface_mut(&mut self) -> &mut M {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::recording::{RecordingSurface, SurfaceCall};
    use crate::state::record;
    use chrono::Utc;

    fn me() -> Profile {
        let mut profile = Profile::new(UserId::new("me"), "me");
        profile.is_hidden = false;
        profile.wardrobe.equipped = "golden".to_string();
        profile
    }

    fn others() -> Vec<PresenceRecord> {
        let now = Utc::now();
        vec![record("ana", 1.0, 1.0, now), record("ben", 2.0, 2.0, now)]
    }

    #[test]
    fn test_desired_includes_self_on_top() {
        let profile = me();
        let desired = desired_markers(&profile, Some(GeoPoint::new(9.0, 9.0)), &others());

        assert_eq!(desired.len(), 3);
        let mine = &desired[0];
        assert!(mine.is_self);
        assert_eq!(mine.z_priority, SELF_Z_PRIORITY);
        assert_eq!(mine.style_id, "golden");
        assert!(desired[1..].iter().all(|m| !m.is_self && m.z_priority == 0));
    }

    #[test]
    fn test_self_in_poll_is_overridden() {
        let profile = me();
        let mut polled = others();
        polled.push(record("me", 50.0, 50.0, Utc::now())); // server's stale copy of us

        let here = GeoPoint::new(9.0, 9.0);
        let desired = desired_markers(&profile, Some(here), &polled);

        let mine: Vec<_> = desired.iter().filter(|m| m.owner_id.as_str() == "me").collect();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].is_self);
        assert_eq!(mine[0].point, here);
    }

    #[test]
    fn test_own_row_dropped_while_hidden() {
        // Hidden locally but the poll still carries our row from before
        let mut polled = others();
        polled.push(record("me", 50.0, 50.0, Utc::now()));

        let desired = desired_markers(&me(), None, &polled);
        assert_eq!(desired.len(), 2);
        assert!(desired.iter().all(|m| m.owner_id.as_str() != "me"));
    }

    #[test]
    fn test_unknown_style_renders_default() {
        let mut polled = others();
        polled[0].pin_style_id = "retired_style".to_string();
        let desired = desired_markers(&me(), None, &polled);
        assert_eq!(desired[0].style_id, "default");
    }

    #[test]
    fn test_duplicate_owner_first_wins() {
        let now = Utc::now();
        let polled = vec![record("ana", 1.0, 1.0, now), record("ana", 5.0, 5.0, now)];
        let desired = desired_markers(&me(), None, &polled);
        assert_eq!(desired.len(), 1);
        assert_eq!(desired[0].point, GeoPoint::new(1.0, 1.0));
    }

    #[test]
    fn test_create_update_remove() {
        let surface = RecordingSurface::default();
        let mut reconciler = MarkerReconciler::new(surface.clone());

        let first = desired_markers(&me(), None, &others());
        let stats = reconciler.apply(&first);
        assert_eq!(stats, ReconcileStats { created: 2, updated: 0, removed: 0 });
        assert_eq!(reconciler.len(), 2);

        // ben leaves, cat arrives, ana moves
        let now = Utc::now();
        let second = desired_markers(&me(), None, &[record("ana", 1.5, 1.5, now), record("cat", 3.0, 3.0, now)]);
        surface.take();
        let stats = reconciler.apply(&second);
        assert_eq!(stats, ReconcileStats { created: 1, updated: 1, removed: 1 });

        let calls = surface.take();
        assert!(calls.contains(&SurfaceCall::Remove(UserId::new("ben"))));
        assert_eq!(
            reconciler.get(&UserId::new("ana")).map(|m| m.point),
            Some(GeoPoint::new(1.5, 1.5))
        );
        assert!(reconciler.get(&UserId::new("ben")).is_none());
    }

    #[test]
    fn test_idempotent() {
        let surface = RecordingSurface::default();
        let mut reconciler = MarkerReconciler::new(surface.clone());
        let profile = me();
        let desired = desired_markers(&profile, Some(GeoPoint::new(9.0, 9.0)), &others());

        reconciler.apply(&desired);
        let second = reconciler.apply(&desired);

        assert_eq!(second.created, 0);
        assert_eq!(second.removed, 0);
        assert_eq!(second.updated, 3);

        let ops = reconciler.plan(&desired);
        assert!(ops.iter().all(|op| matches!(op, MarkerOp::Update(_))));
    }

    #[test]
    fn test_empty_desired_removes_all() {
        let surface = RecordingSurface::default();
        let mut reconciler = MarkerReconciler::new(surface.clone());
        reconciler.apply(&desired_markers(&me(), None, &others()));

        let stats = reconciler.apply(&[]);
        assert_eq!(stats.removed, 2);
        assert!(reconciler.is_empty());
    }

    #[test]
    fn test_clear() {
        let surface = RecordingSurface::default();
        let mut reconciler = MarkerReconciler::new(surface.clone());
        reconciler.apply(&desired_markers(&me(), None, &others()));
        surface.take();

        assert_eq!(reconciler.clear(), 2);
        assert!(reconciler.is_empty());
        let removes = surface
            .take()
            .into_iter()
            .filter(|c| matches!(c, SurfaceCall::Remove(_)))
            .count();
        assert_eq!(removes, 2);
    }
}
