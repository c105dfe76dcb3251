use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Stable key of a tracked entity: the namespace and name of its ingress.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub namespace: String,
    pub name: String,
}

impl Identity {
    pub fn new<N, M>(namespace: N, name: M) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Identity {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reference from an ingress path to a service port.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Backend {
    pub service_name: String,
    pub service_port: i32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HttpPath {
    pub path: Option<String>,
    pub backend: Backend,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IngressRule {
    pub host: Option<String>,
    #[serde(default)]
    pub paths: Vec<HttpPath>,
}

/// The operator-authored routing intent for one load balancer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct IngressSpec {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub default_backend: Option<Backend>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIP,
    NodePort,
    LoadBalancer,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServicePort {
    pub port: i32,
    pub node_port: Option<i32>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceSpec {
    pub namespace: String,
    pub name: String,
    pub r#type: ServiceType,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

/// A cloud load balancer as reported by the inventory.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, Hash)]
pub struct LoadBalancerHandle {
    pub arn: String,
    pub name: String,
}

impl LoadBalancerHandle {
    pub fn new<A, N>(arn: A, name: N) -> Self
    where
        A: Into<String>,
        N: Into<String>,
    {
        LoadBalancerHandle {
            arn: arn.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    #[default]
    Internal,
    InternetFacing,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenPort {
    pub protocol: Protocol,
    pub port: u16,
}

/// One host/path routing rule with its resolved target.
///
/// `node_port` is `None` when the backend service could not be resolved; such
/// an entity is always tainted.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RoutingRule {
    pub host: Option<String>,
    pub path: Option<String>,
    pub service: String,
    pub service_port: i32,
    pub node_port: Option<i32>,
}

/// The desired configuration of the cloud resources owned by one ingress.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, Default)]
pub struct DesiredState {
    pub scheme: Scheme,
    pub listen_ports: Vec<ListenPort>,
    pub certificate_arn: Option<String>,
    pub health_check_path: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub hostnames: Vec<String>,
    pub rules: Vec<RoutingRule>,
}

/// The controller's record of one ingress: what it should look like and which
/// load balancers are believed to exist for it.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TrackedEntity {
    pub identity: Identity,
    /// `None` means the entity is pending teardown.
    pub desired_state: Option<DesiredState>,
    pub load_balancers: Vec<LoadBalancerHandle>,
    pub tainted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taint_reasons: Vec<String>,
    /// Tainted and its ingress is gone. Kept for visibility, never converged.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retained: bool,
}

impl TrackedEntity {
    pub fn new(identity: Identity, desired_state: DesiredState) -> Self {
        TrackedEntity {
            identity,
            desired_state: Some(desired_state),
            load_balancers: Vec::new(),
            tainted: false,
            taint_reasons: Vec::new(),
            retained: false,
        }
    }

    /// An entity recovered from the cloud: known resources, no intent yet.
    pub fn discovered(identity: Identity, load_balancer: LoadBalancerHandle) -> Self {
        TrackedEntity {
            identity,
            desired_state: None,
            load_balancers: vec![load_balancer],
            tainted: false,
            taint_reasons: Vec::new(),
            retained: false,
        }
    }

    /// Clears the desired state, which tells convergence to tear everything down.
    pub fn strip_desired_state(&mut self) {
        self.desired_state = None;
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.desired_state.is_none()
    }

    pub fn needs_convergence(&self) -> bool {
        !self.retained
    }
}

/// Tracked entities keyed by identity, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntitySet {
    entities: IndexMap<Identity, TrackedEntity>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entity, returning the one it replaced if the identity was taken.
    pub fn insert(&mut self, entity: TrackedEntity) -> Option<TrackedEntity> {
        self.entities.insert(entity.identity.clone(), entity)
    }

    pub fn get(&self, identity: &Identity) -> Option<&TrackedEntity> {
        self.entities.get(identity)
    }

    pub fn get_mut(&mut self, identity: &Identity) -> Option<&mut TrackedEntity> {
        self.entities.get_mut(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entities.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    pub fn tainted_count(&self) -> usize {
        self.iter().filter(|e| e.tainted).count()
    }

    pub fn pending_deletion_count(&self) -> usize {
        self.iter().filter(|e| e.is_pending_deletion()).count()
    }
}

impl FromIterator<TrackedEntity> for EntitySet {
    fn from_iter<T: IntoIterator<Item = TrackedEntity>>(iter: T) -> Self {
        let mut set = EntitySet::new();
        for entity in iter {
            set.insert(entity);
        }
        set
    }
}

impl IntoIterator for EntitySet {
    type Item = TrackedEntity;
    type IntoIter = indexmap::map::IntoValues<Identity, TrackedEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_values()
    }
}

impl Serialize for EntitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entities.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display_and_json() {
        let id = Identity::new("shop", "web");
        assert_eq!(id.to_string(), "shop/web");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"shop/web\"");
    }

    #[test]
    fn test_entity_set_keeps_identities_unique() {
        let mut set = EntitySet::new();
        let id = Identity::new("ns", "a");
        assert!(
            set.insert(TrackedEntity::new(id.clone(), DesiredState::default()))
                .is_none()
        );

        let mut replacement = TrackedEntity::new(id.clone(), DesiredState::default());
        replacement.tainted = true;
        assert!(set.insert(replacement).is_some());

        assert_eq!(set.len(), 1);
        assert!(set.get(&id).unwrap().tainted);
        assert_eq!(set.tainted_count(), 1);
    }

    #[test]
    fn test_strip_desired_state() {
        let mut entity = TrackedEntity::new(Identity::new("ns", "a"), DesiredState::default());
        assert!(!entity.is_pending_deletion());
        entity.strip_desired_state();
        assert!(entity.is_pending_deletion());
    }
}
