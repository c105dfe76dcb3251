use crate::bootstrap::{self, BootstrapError};
use crate::builder::Builder;
use crate::cloud::{Converger, LoadBalancerInventory};
use crate::config::{Config, ValidationError};
use crate::diff::{DiffSummary, diff};
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::identity::ResourceNaming;
use crate::manifest::ClusterSnapshot;
use crate::metrics_defs::{
    CONVERGENCE_CYCLES, DIFF_CYCLES, MANAGED_ENTITIES, PENDING_DELETION_ENTITIES, TAINTED_ENTITIES,
};
use crate::state::{FleetState, StateStore};
use shared::{counter, gauge};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
}

#[derive(Debug)]
pub enum Command {
    // The complete current list of ingresses and services.
    Sync(ClusterSnapshot),
    // Finish the current cycle and stop.
    Shutdown,
}

/// Drives reconciliation cycles: diff the current ingresses against the tracked
/// entities, then converge every tracked entity.
///
/// The controller is the only writer of the state store.
pub struct Controller {
    naming: ResourceNaming,
    ingress_class: String,
    bootstrap_concurrency: usize,
    inventory: Arc<dyn LoadBalancerInventory>,
    dispatcher: Dispatcher,
    state: Arc<StateStore>,
}

impl Controller {
    pub fn new(
        config: &Config,
        inventory: Arc<dyn LoadBalancerInventory>,
        converger: Arc<dyn Converger>,
        state: Arc<StateStore>,
    ) -> Self {
        Controller {
            naming: ResourceNaming::new(&config.cluster_name),
            ingress_class: config.ingress_class.clone(),
            bootstrap_concurrency: config.bootstrap.max_concurrency,
            inventory,
            dispatcher: Dispatcher::new(converger, config.convergence.limits()),
            state,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_initialized()
    }

    /// Replaces the tracked entities with the result of diffing them against
    /// `snapshot`. The first call bootstraps the entities from the cloud.
    pub async fn on_update(&self, snapshot: &ClusterSnapshot) -> Result<DiffSummary, ControllerError> {
        let previous = match self.state.snapshot() {
            Some(previous) => previous,
            None => {
                let bootstrap = bootstrap::resync(
                    self.inventory.as_ref(),
                    &self.naming,
                    self.bootstrap_concurrency,
                )
                .await?;
                Arc::new(FleetState {
                    entities: bootstrap.entities,
                    orphaned: bootstrap.orphaned,
                    last_diff: None,
                })
            }
        };

        counter!(DIFF_CYCLES).increment(1);
        tracing::debug!("Diffing ingresses against tracked entities");

        let builder = Builder::new(&self.naming, &snapshot.services);
        let (entities, summary) = diff(
            &previous.entities,
            &snapshot.ingresses,
            &self.ingress_class,
            &builder,
        );

        gauge!(MANAGED_ENTITIES).set(entities.len() as f64);
        gauge!(TAINTED_ENTITIES).set(entities.tainted_count() as f64);
        gauge!(PENDING_DELETION_ENTITIES).set(entities.pending_deletion_count() as f64);
        tracing::info!(entities = entities.len(), summary = ?summary, "Diff complete");

        self.state.replace(FleetState {
            entities,
            orphaned: previous.orphaned.clone(),
            last_diff: Some(summary.clone()),
        });
        Ok(summary)
    }

    /// Converges every tracked entity and records the post-convergence state.
    /// Entities that failed keep the state they had before. Retained tainted
    /// entities are skipped.
    pub async fn reload(&self) -> DispatchReport {
        let Some(current) = self.state.snapshot() else {
            return DispatchReport::default();
        };
        counter!(CONVERGENCE_CYCLES).increment(1);

        let report = self
            .dispatcher
            .dispatch(
                current
                    .entities
                    .iter()
                    .filter(|e| e.needs_convergence())
                    .cloned()
                    .collect(),
            )
            .await;

        let mut next = (*current).clone();
        for entity in &report.converged {
            next.entities.insert(entity.clone());
        }
        self.state.replace(next);

        tracing::info!(
            converged = report.converged.len(),
            failed = report.failed.len(),
            "Convergence complete"
        );
        report
    }

    pub async fn sync(&self, snapshot: &ClusterSnapshot) -> Result<(), ControllerError> {
        self.on_update(snapshot).await?;
        self.reload().await;
        Ok(())
    }

    /// Runs a cycle for every `Sync` command until `Shutdown` or until all
    /// senders are gone. Queued snapshots are coalesced, only the latest one is
    /// reconciled.
    pub async fn run(&self, mut rx: mpsc::Receiver<Command>) -> Result<(), ControllerError> {
        if !self.ingress_class.is_empty() {
            tracing::info!(ingress_class = %self.ingress_class, "Ingress class set");
        }

        while let Some(command) = rx.recv().await {
            let Command::Sync(snapshot) = command else {
                break;
            };

            let (snapshot, shutdown) = coalesce(snapshot, &mut rx);
            self.sync(&snapshot).await?;

            if shutdown {
                break;
            }
        }

        tracing::info!("Shutting down controller");
        Ok(())
    }
}

fn coalesce(
    mut latest: ClusterSnapshot,
    rx: &mut mpsc::Receiver<Command>,
) -> (ClusterSnapshot, bool) {
    loop {
        match rx.try_recv() {
            Ok(Command::Sync(next)) => latest = next,
            Ok(Command::Shutdown) => return (latest, true),
            Err(_) => return (latest, false),
        }
    }
}
