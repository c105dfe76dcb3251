//! Rebuilds the tracked entity set from the load balancers that already exist
//! when the controller starts without any in-memory state.
use crate::cloud::{CloudError, LoadBalancerInventory};
use crate::identity::{NameError, ResourceNaming};
use crate::metrics_defs::{BOOTSTRAP_DISCOVERED, BOOTSTRAP_ORPHANED};
use crate::types::{EntitySet, Identity, LoadBalancerHandle, TrackedEntity};
use shared::counter;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    #[error("could not list existing load balancers: {0}")]
    Inventory(#[from] CloudError),
}

/// What bootstrap recovered from the cloud.
#[derive(Debug, Default)]
pub struct Bootstrap {
    pub entities: EntitySet,
    /// Load balancers whose name could not be mapped back to an ingress.
    pub orphaned: Vec<LoadBalancerHandle>,
}

struct Discovery {
    load_balancer: LoadBalancerHandle,
    owner: Result<Identity, NameError>,
}

/// Lists the cluster's load balancers and groups them by owning identity.
///
/// Each load balancer is examined by its own task, at most `max_concurrency` at
/// a time. Results flow through a channel to this function, which is the only
/// writer of the entity set. A failed listing is returned as an error: starting
/// from an empty view would make every existing load balancer look abandoned.
pub async fn resync(
    inventory: &dyn LoadBalancerInventory,
    naming: &ResourceNaming,
    max_concurrency: usize,
) -> Result<Bootstrap, BootstrapError> {
    tracing::info!(cluster = naming.cluster(), "Building tracked entities from existing load balancers");

    let load_balancers = inventory
        .list_managed_load_balancers(naming.cluster())
        .await?;

    let (tx, mut rx) = mpsc::channel::<Discovery>(max_concurrency.max(1));
    let limiter = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for load_balancer in load_balancers {
        let tx = tx.clone();
        let limiter = limiter.clone();
        let naming = naming.clone();

        join_set.spawn(async move {
            // The semaphore is never closed.
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };
            let owner = naming.decode(&load_balancer.name);
            let _ = tx
                .send(Discovery {
                    load_balancer,
                    owner,
                })
                .await;
        });
    }
    // Only the spawned tasks hold senders now, so `recv` ends once they finish.
    drop(tx);

    let mut bootstrap = Bootstrap::default();
    while let Some(discovery) = rx.recv().await {
        merge(&mut bootstrap, discovery);
    }

    while let Some(result) = join_set.join_next().await {
        if let Err(e) = result {
            tracing::error!("Discovery task panicked: {e}");
        }
    }

    tracing::info!(
        entities = bootstrap.entities.len(),
        orphaned = bootstrap.orphaned.len(),
        "Assembled tracked entities from existing load balancers"
    );
    Ok(bootstrap)
}

fn merge(bootstrap: &mut Bootstrap, discovery: Discovery) {
    let Discovery {
        load_balancer,
        owner,
    } = discovery;

    let identity = match owner {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(
                arn = %load_balancer.arn,
                name = %load_balancer.name,
                error = %e,
                "Load balancer has no recognizable owner, leaving it untouched"
            );
            counter!(BOOTSTRAP_ORPHANED).increment(1);
            bootstrap.orphaned.push(load_balancer);
            return;
        }
    };

    counter!(BOOTSTRAP_DISCOVERED).increment(1);
    match bootstrap.entities.get_mut(&identity) {
        Some(entity) => {
            tracing::warn!(
                identity = %identity,
                arn = %load_balancer.arn,
                "Found a duplicate load balancer for the same ingress"
            );
            entity.load_balancers.push(load_balancer);
        }
        None => {
            bootstrap
                .entities
                .insert(TrackedEntity::discovered(identity, load_balancer));
        }
    }
}
