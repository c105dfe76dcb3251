use crate::cloud::{
    CloudError, ConvergeError, Converger, LoadBalancerInventory, PortResolver, ResolveError,
};
use crate::manifest::ServiceCatalog;
use crate::types::{
    Backend, IngressSpec, LoadBalancerHandle, ServicePort, ServiceSpec, ServiceType, TrackedEntity,
};
use async_trait::async_trait;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// An ingress with a single default backend.
pub fn ingress(namespace: &str, name: &str, service: &str, port: i32) -> IngressSpec {
    IngressSpec {
        namespace: namespace.into(),
        name: name.into(),
        annotations: BTreeMap::new(),
        default_backend: Some(Backend {
            service_name: service.into(),
            service_port: port,
        }),
        rules: vec![],
    }
}

#[derive(Default)]
pub struct FakeServices {
    services: Vec<ServiceSpec>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_port(mut self, namespace: &str, name: &str, port: i32, node_port: i32) -> Self {
        self.services
            .push(service(namespace, name, ServiceType::NodePort, port, Some(node_port)));
        self
    }

    pub fn cluster_ip(mut self, namespace: &str, name: &str, port: i32) -> Self {
        self.services
            .push(service(namespace, name, ServiceType::ClusterIP, port, None));
        self
    }

    pub fn specs(&self) -> Vec<ServiceSpec> {
        self.services.clone()
    }
}

impl PortResolver for FakeServices {
    fn resolve_node_port(&self, service_key: &str, backend_port: i32) -> Result<i32, ResolveError> {
        ServiceCatalog::new(self.specs()).resolve_node_port(service_key, backend_port)
    }
}

fn service(
    namespace: &str,
    name: &str,
    r#type: ServiceType,
    port: i32,
    node_port: Option<i32>,
) -> ServiceSpec {
    ServiceSpec {
        namespace: namespace.into(),
        name: name.into(),
        r#type,
        ports: vec![ServicePort { port, node_port }],
    }
}

pub struct FakeInventory {
    result: Result<Vec<LoadBalancerHandle>, CloudError>,
    list_calls: AtomicUsize,
}

impl FakeInventory {
    pub fn new(load_balancers: Vec<LoadBalancerHandle>) -> Self {
        FakeInventory {
            result: Ok(load_balancers),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CloudError) -> Self {
        FakeInventory {
            result: Err(error),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoadBalancerInventory for FakeInventory {
    async fn list_managed_load_balancers(
        &self,
        _cluster: &str,
    ) -> Result<Vec<LoadBalancerHandle>, CloudError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Converges by pretending to create a single load balancer per entity, or to
/// delete all of them for entities pending deletion. Selected entities fail,
/// panic or hang.
#[derive(Default)]
pub struct ScriptedConverger {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    hanging: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedConverger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, name: &str) -> Self {
        self.failing.insert(name.into());
        self
    }

    pub fn panic(mut self, name: &str) -> Self {
        self.panicking.insert(name.into());
        self
    }

    pub fn hang(mut self, name: &str) -> Self {
        self.hanging.insert(name.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Names of the entities converge was called for, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Converger for ScriptedConverger {
    async fn converge(&self, mut entity: TrackedEntity) -> Result<TrackedEntity, ConvergeError> {
        let name = entity.identity.name.clone();
        self.seen.lock().push(name.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.hanging.contains(&name) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(&name) {
            panic!("converger exploded for {name}");
        }
        if self.failing.contains(&name) {
            return Err(ConvergeError::Cloud(CloudError::Api {
                operation: "CreateLoadBalancer",
                message: format!("refused {name}"),
            }));
        }

        if entity.is_pending_deletion() {
            entity.load_balancers.clear();
        } else if entity.load_balancers.is_empty() {
            entity.load_balancers.push(LoadBalancerHandle::new(
                format!("arn:{}", entity.identity),
                format!("prod/{}", entity.identity),
            ));
        }
        Ok(entity)
    }
}

/// Records counter values by name. Gauges and histograms are dropped.
#[derive(Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .get(name)
            .map_or(0, |value| value.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let value = self
            .counters
            .lock()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Counter::from_arc(value)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
