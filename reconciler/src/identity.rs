//! Identity derivation, the ingress class filter and the load balancer naming
//! convention that maps identities to cloud resource names and back.
use crate::types::{Identity, IngressSpec};

pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

const NAME_SEPARATOR: char = '/';
const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;
pub const MAX_CLUSTER_NAME_LEN: usize = 11;

pub fn identity_of(spec: &IngressSpec) -> Identity {
    Identity::new(spec.namespace.clone(), spec.name.clone())
}

/// An empty filter class manages everything. Otherwise the class annotation must
/// match exactly.
pub fn is_managed(spec: &IngressSpec, filter_class: &str) -> bool {
    if filter_class.is_empty() {
        return true;
    }
    spec.annotations
        .get(INGRESS_CLASS_ANNOTATION)
        .is_some_and(|class| class == filter_class)
}

/// Why a load balancer name could not be mapped back to an identity.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("name does not carry the cluster prefix '{0}'")]
    ForeignCluster(String),
    #[error("expected <cluster>/<namespace>/<name>")]
    Malformed,
    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),
    #[error("invalid ingress name '{0}'")]
    InvalidName(String),
}

/// Encodes `(cluster, identity)` as `<cluster>/<namespace>/<name>`.
///
/// None of the three components may contain the separator, so `encode` and
/// `decode` are inverse of each other for every identity `encode` accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNaming {
    cluster: String,
    prefix: String,
}

impl ResourceNaming {
    pub fn new(cluster: &str) -> Self {
        ResourceNaming {
            cluster: cluster.to_string(),
            prefix: format!("{cluster}{NAME_SEPARATOR}"),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn belongs_to_cluster(&self, resource_name: &str) -> bool {
        resource_name.starts_with(&self.prefix)
    }

    pub fn encode(&self, identity: &Identity) -> Result<String, NameError> {
        validate_identity(identity)?;
        Ok(format!(
            "{}{}{NAME_SEPARATOR}{}",
            self.prefix, identity.namespace, identity.name
        ))
    }

    pub fn decode(&self, resource_name: &str) -> Result<Identity, NameError> {
        let rest = resource_name
            .strip_prefix(&self.prefix)
            .ok_or_else(|| NameError::ForeignCluster(self.cluster.clone()))?;
        let (namespace, name) = rest
            .split_once(NAME_SEPARATOR)
            .ok_or(NameError::Malformed)?;
        let identity = Identity::new(namespace, name);
        validate_identity(&identity)?;
        Ok(identity)
    }
}

fn validate_identity(identity: &Identity) -> Result<(), NameError> {
    if !is_dns_label(&identity.namespace) {
        return Err(NameError::InvalidNamespace(identity.namespace.clone()));
    }
    if !is_dns_subdomain(&identity.name) {
        return Err(NameError::InvalidName(identity.name.clone()));
    }
    Ok(())
}

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends.
pub fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_LABEL_LEN
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// RFC 1123 subdomain: dot separated labels.
pub fn is_dns_subdomain(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_SUBDOMAIN_LEN && s.split('.').all(is_dns_label)
}
