//! Derives the next tracked entity set from the previous one and the current
//! ingresses.
use crate::builder::{BuildOutcome, Builder};
use crate::identity::is_managed;
use crate::types::{EntitySet, IngressSpec};
use serde::Serialize;

/// Counts of what a single diff decided, for logging and introspection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub built: usize,
    pub tainted: usize,
    pub dropped: usize,
    pub unmanaged: usize,
    /// Entities whose ingress is gone and whose load balancers must be removed.
    pub pending_deletion: usize,
    /// Entities whose ingress is gone and that own nothing anymore.
    pub forgotten: usize,
    /// Tainted entities whose ingress is gone, kept untouched.
    pub retained_tainted: usize,
}

/// Computes the next entity set.
///
/// Every managed ingress is rebuilt from scratch and inherits the load balancers
/// its previous entity knew about. Previous entities without an ingress are
/// stripped for teardown while they still own load balancers, and forgotten
/// otherwise. Tainted entities are never stripped: they are kept as they were
/// and marked `retained`, which keeps them out of convergence.
pub fn diff(
    previous: &EntitySet,
    specs: &[IngressSpec],
    filter_class: &str,
    builder: &Builder<'_>,
) -> (EntitySet, DiffSummary) {
    let mut summary = DiffSummary::default();
    let mut next = EntitySet::new();

    for spec in specs {
        if !is_managed(spec, filter_class) {
            summary.unmanaged += 1;
            continue;
        }

        let mut entity = match builder.build(spec) {
            BuildOutcome::Dropped(reason) => {
                tracing::debug!(
                    namespace = %spec.namespace,
                    name = %spec.name,
                    reason = ?reason,
                    "Ignoring ingress"
                );
                summary.dropped += 1;
                continue;
            }
            BuildOutcome::Tainted(entity) => {
                tracing::warn!(
                    identity = %entity.identity,
                    reasons = ?entity.taint_reasons,
                    "Ingress could only be partially translated"
                );
                summary.tainted += 1;
                entity
            }
            BuildOutcome::Built(entity) => {
                summary.built += 1;
                entity
            }
        };

        if let Some(known) = previous.get(&entity.identity) {
            entity.load_balancers = known.load_balancers.clone();
        }

        if let Some(replaced) = next.insert(entity) {
            tracing::warn!(identity = %replaced.identity, "Duplicate ingress identity, keeping the last one");
        }
    }

    for entity in previous.iter() {
        if next.contains(&entity.identity) {
            continue;
        }

        if entity.tainted {
            let mut retained = entity.clone();
            retained.retained = true;
            summary.retained_tainted += 1;
            next.insert(retained);
        } else if entity.load_balancers.is_empty() {
            summary.forgotten += 1;
        } else {
            let mut deletable = entity.clone();
            deletable.strip_desired_state();
            summary.pending_deletion += 1;
            next.insert(deletable);
        }
    }

    (next, summary)
}
