//! Interfaces to the collaborators around the reconciliation engine: the cloud
//! inventory used by bootstrap, per-entity convergence, and the backend port
//! resolver used by the desired-state builder.
use crate::types::{LoadBalancerHandle, TrackedEntity};
use async_trait::async_trait;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
    #[error("request throttled during {0}")]
    Throttled(&'static str),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvergeError {
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),
    #[error("convergence timed out after {0:?}")]
    TimedOut(Duration),
    #[error("convergence aborted at the dispatch deadline")]
    DeadlineExceeded,
    #[error("convergence task panicked: {0}")]
    Panicked(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unable to find the {0} service")]
    NotFound(String),
    #[error("{0} service is not of type NodePort")]
    WrongType(String),
    #[error("unable to find port {port} in the {service} service")]
    PortNotFound { service: String, port: i32 },
}

/// Lists the load balancers that belong to a cluster.
#[async_trait]
pub trait LoadBalancerInventory: Send + Sync {
    async fn list_managed_load_balancers(
        &self,
        cluster: &str,
    ) -> Result<Vec<LoadBalancerHandle>, CloudError>;
}

/// Makes the cloud match one entity.
///
/// Receives the entity and returns its post-convergence state, in particular the
/// load balancers that exist afterwards. An entity without desired state must be
/// torn down.
///
/// The dispatcher may drop the future at any await point once its deadline
/// passes, and the entity then keeps the load balancers it had before. Before
/// creating a load balancer, implementations must look for an existing one
/// named `ResourceNaming::encode(identity)` and adopt it, so a cancelled
/// creation is picked up again by the next cycle.
#[async_trait]
pub trait Converger: Send + Sync {
    async fn converge(&self, entity: TrackedEntity) -> Result<TrackedEntity, ConvergeError>;
}

/// Maps a service port to the node port the load balancer targets.
pub trait PortResolver: Send + Sync {
    /// `service_key` is `<namespace>/<name>`.
    fn resolve_node_port(&self, service_key: &str, backend_port: i32) -> Result<i32, ResolveError>;
}
