use crate::diff::DiffSummary;
use crate::types::{EntitySet, LoadBalancerHandle};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Everything the controller currently believes about its fleet.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FleetState {
    pub entities: EntitySet,
    /// Load balancers found at bootstrap that could not be attributed to an ingress.
    pub orphaned: Vec<LoadBalancerHandle>,
    pub last_diff: Option<DiffSummary>,
}

/// Holds the process-wide fleet state.
///
/// The controller loop is the only writer and swaps in a whole new state with
/// `replace`. Readers get an `Arc` to an immutable snapshot, so serializing a
/// large state never holds the lock.
#[derive(Default)]
pub struct StateStore {
    current: RwLock<Option<Arc<FleetState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until bootstrap has populated the store.
    pub fn snapshot(&self) -> Option<Arc<FleetState>> {
        self.current.read().clone()
    }

    pub fn replace(&self, state: FleetState) {
        *self.current.write() = Some(Arc::new(state));
    }

    pub fn is_initialized(&self) -> bool {
        self.current.read().is_some()
    }
}
