//! A cloud backend that keeps load balancers in memory.
//!
//! Used to run the controller without cloud credentials: every change it would
//! make is logged, and the in-memory table behaves like a real inventory across
//! cycles.
use crate::cloud::{CloudError, ConvergeError, Converger, LoadBalancerInventory};
use crate::identity::ResourceNaming;
use crate::types::{LoadBalancerHandle, TrackedEntity};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct DryRunCloud {
    naming: ResourceNaming,
    load_balancers: Mutex<BTreeMap<String, LoadBalancerHandle>>,
    next_id: AtomicU64,
}

impl DryRunCloud {
    pub fn new(naming: ResourceNaming) -> Self {
        DryRunCloud {
            naming,
            load_balancers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a load balancer as if it had been created by an earlier run.
    pub fn seed(&self, load_balancer: LoadBalancerHandle) {
        self.load_balancers
            .lock()
            .insert(load_balancer.arn.clone(), load_balancer);
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancerHandle> {
        self.load_balancers.lock().values().cloned().collect()
    }

    fn create(&self, name: String) -> LoadBalancerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = LoadBalancerHandle::new(
            format!("arn:dry-run:elasticloadbalancing:loadbalancer/app/{id}"),
            name,
        );
        tracing::info!(arn = %handle.arn, name = %handle.name, "Would create load balancer");
        self.seed(handle.clone());
        handle
    }

    fn find_by_name(&self, name: &str) -> Option<LoadBalancerHandle> {
        self.load_balancers
            .lock()
            .values()
            .find(|lb| lb.name == name)
            .cloned()
    }

    fn delete(&self, handle: &LoadBalancerHandle) {
        tracing::info!(arn = %handle.arn, name = %handle.name, "Would delete load balancer");
        self.load_balancers.lock().remove(&handle.arn);
    }
}

#[async_trait]
impl LoadBalancerInventory for DryRunCloud {
    async fn list_managed_load_balancers(
        &self,
        cluster: &str,
    ) -> Result<Vec<LoadBalancerHandle>, CloudError> {
        let naming = ResourceNaming::new(cluster);
        Ok(self
            .load_balancers
            .lock()
            .values()
            .filter(|lb| naming.belongs_to_cluster(&lb.name))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Converger for DryRunCloud {
    async fn converge(&self, mut entity: TrackedEntity) -> Result<TrackedEntity, ConvergeError> {
        let Some(desired) = &entity.desired_state else {
            for handle in entity.load_balancers.drain(..) {
                self.delete(&handle);
            }
            return Ok(entity);
        };

        if entity.load_balancers.is_empty() {
            let name = self
                .naming
                .encode(&entity.identity)
                .map_err(|e| CloudError::Api {
                    operation: "CreateLoadBalancer",
                    message: e.to_string(),
                })?;
            let handle = match self.find_by_name(&name) {
                Some(existing) => {
                    tracing::info!(arn = %existing.arn, name = %existing.name, "Adopting existing load balancer");
                    existing
                }
                None => self.create(name),
            };
            entity.load_balancers.push(handle);
        }

        // Keep the first load balancer, remove duplicates left by earlier runs.
        for duplicate in entity.load_balancers.split_off(1) {
            self.delete(&duplicate);
        }

        tracing::debug!(
            identity = %entity.identity,
            arn = %entity.load_balancers[0].arn,
            scheme = ?desired.scheme,
            listeners = desired.listen_ports.len(),
            rules = desired.rules.len(),
            hostnames = ?desired.hostnames,
            "Would reconcile listeners, rules, target groups and DNS records"
        );
        Ok(entity)
    }
}
