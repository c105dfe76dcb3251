//! Metrics definitions for the reconciler.

use shared::metrics_defs::{MetricDef, MetricType};

pub const DIFF_CYCLES: MetricDef = MetricDef {
    name: "reconciler.diff.cycles",
    metric_type: MetricType::Counter,
    description: "Number of diff cycles run",
};

pub const CONVERGENCE_CYCLES: MetricDef = MetricDef {
    name: "reconciler.convergence.cycles",
    metric_type: MetricType::Counter,
    description: "Number of convergence dispatches run",
};

pub const CONVERGENCE_FAILURES: MetricDef = MetricDef {
    name: "reconciler.convergence.failures",
    metric_type: MetricType::Counter,
    description: "Number of entities whose convergence failed, timed out or panicked",
};

pub const DISPATCH_DURATION: MetricDef = MetricDef {
    name: "reconciler.convergence.duration",
    metric_type: MetricType::Histogram,
    description: "Time to converge all tracked entities in seconds",
};

pub const MANAGED_ENTITIES: MetricDef = MetricDef {
    name: "reconciler.entities.managed",
    metric_type: MetricType::Gauge,
    description: "Size of the tracked entity set",
};

pub const TAINTED_ENTITIES: MetricDef = MetricDef {
    name: "reconciler.entities.tainted",
    metric_type: MetricType::Gauge,
    description: "Tracked entities whose ingress could only be partially translated",
};

pub const PENDING_DELETION_ENTITIES: MetricDef = MetricDef {
    name: "reconciler.entities.pending_deletion",
    metric_type: MetricType::Gauge,
    description: "Tracked entities waiting for their load balancers to be removed",
};

pub const BOOTSTRAP_DISCOVERED: MetricDef = MetricDef {
    name: "reconciler.bootstrap.discovered",
    metric_type: MetricType::Counter,
    description: "Load balancers attributed to an ingress during bootstrap",
};

pub const BOOTSTRAP_ORPHANED: MetricDef = MetricDef {
    name: "reconciler.bootstrap.orphaned",
    metric_type: MetricType::Counter,
    description: "Load balancers found during bootstrap without a recognizable owner",
};

pub const ALL_METRICS: &[MetricDef] = &[
    DIFF_CYCLES,
    CONVERGENCE_CYCLES,
    CONVERGENCE_FAILURES,
    DISPATCH_DURATION,
    MANAGED_ENTITIES,
    TAINTED_ENTITIES,
    PENDING_DELETION_ENTITIES,
    BOOTSTRAP_DISCOVERED,
    BOOTSTRAP_ORPHANED,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_unique() {
        assert_eq!(shared::metrics_defs::find_duplicate(ALL_METRICS), None);
    }
}
