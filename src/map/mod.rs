mod marker;
mod reconcile;

pub use marker::{MapMarker, MapSurface, TracingSurface, SELF_Z_PRIORITY};
pub use reconcile::{desired_markers, MarkerOp, MarkerReconciler, ReconcileStats};

#[cfg(test)]
pub(crate) use marker::recording;
