//! Translates one ingress into one tracked entity.
use crate::cloud::PortResolver;
use crate::identity::{NameError, ResourceNaming, identity_of};
use crate::types::{
    Backend, DesiredState, IngressSpec, ListenPort, Protocol, RoutingRule, Scheme, TrackedEntity,
};
use std::collections::{BTreeMap, BTreeSet};

const ANNOTATION_PREFIX: &str = "alb.ingress.kubernetes.io/";
const SCHEME: &str = "scheme";
const LISTEN_PORTS: &str = "listen-ports";
const CERTIFICATE_ARN: &str = "certificate-arn";
const HEALTHCHECK_PATH: &str = "healthcheck-path";
const SUBNETS: &str = "subnets";
const SECURITY_GROUPS: &str = "security-groups";
const TAGS: &str = "tags";

const DEFAULT_HEALTHCHECK_PATH: &str = "/";

#[derive(Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Neither a default backend nor any rule path references a service.
    NoBackend,
    /// The identity cannot be expressed as a load balancer name.
    Unnameable(NameError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The ingress cannot be managed at all and is ignored for this cycle.
    Dropped(DropReason),
    /// Partially translated; `taint_reasons` on the entity say what failed.
    Tainted(TrackedEntity),
    Built(TrackedEntity),
}

impl BuildOutcome {
    pub fn into_entity(self) -> Option<TrackedEntity> {
        match self {
            BuildOutcome::Dropped(_) => None,
            BuildOutcome::Tainted(entity) | BuildOutcome::Built(entity) => Some(entity),
        }
    }
}

pub struct Builder<'a> {
    naming: &'a ResourceNaming,
    resolver: &'a dyn PortResolver,
}

impl<'a> Builder<'a> {
    pub fn new(naming: &'a ResourceNaming, resolver: &'a dyn PortResolver) -> Self {
        Builder { naming, resolver }
    }

    pub fn build(&self, spec: &IngressSpec) -> BuildOutcome {
        let identity = identity_of(spec);
        if let Err(e) = self.naming.encode(&identity) {
            return BuildOutcome::Dropped(DropReason::Unnameable(e));
        }

        let backends = backends_of(spec);
        if backends.is_empty() {
            return BuildOutcome::Dropped(DropReason::NoBackend);
        }

        let mut problems = Vec::new();
        let annotations = Annotations::new(spec);

        let rules = backends
            .into_iter()
            .map(|(host, path, backend)| {
                let service_key = format!("{}/{}", spec.namespace, backend.service_name);
                let node_port = self
                    .resolver
                    .resolve_node_port(&service_key, backend.service_port)
                    .map_err(|e| problems.push(e.to_string()))
                    .ok();
                RoutingRule {
                    host,
                    path,
                    service: backend.service_name.clone(),
                    service_port: backend.service_port,
                    node_port,
                }
            })
            .collect::<Vec<_>>();

        let hostnames = rules
            .iter()
            .filter_map(|r| r.host.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let scheme = annotations.scheme().unwrap_or_else(|e| {
            problems.push(e);
            Scheme::default()
        });
        let listen_ports = annotations.listen_ports().unwrap_or_else(|e| {
            problems.push(e);
            default_listen_ports()
        });
        let certificate_arn = annotations.get(CERTIFICATE_ARN).map(str::to_string);
        if certificate_arn.is_none() && listen_ports.iter().any(|p| p.protocol == Protocol::Https) {
            problems.push(format!(
                "an HTTPS listener requires the {ANNOTATION_PREFIX}{CERTIFICATE_ARN} annotation"
            ));
        }
        let tags = annotations.tags(&mut problems);

        let desired_state = DesiredState {
            scheme,
            listen_ports,
            certificate_arn,
            health_check_path: annotations
                .get(HEALTHCHECK_PATH)
                .unwrap_or(DEFAULT_HEALTHCHECK_PATH)
                .to_string(),
            subnets: annotations.list(SUBNETS),
            security_groups: annotations.list(SECURITY_GROUPS),
            tags,
            hostnames,
            rules,
        };

        let mut entity = TrackedEntity::new(identity, desired_state);
        if problems.is_empty() {
            BuildOutcome::Built(entity)
        } else {
            entity.tainted = true;
            entity.taint_reasons = problems;
            BuildOutcome::Tainted(entity)
        }
    }
}

fn backends_of(spec: &IngressSpec) -> Vec<(Option<String>, Option<String>, &Backend)> {
    let mut backends = Vec::new();
    if let Some(backend) = &spec.default_backend {
        backends.push((None, None, backend));
    }
    for rule in &spec.rules {
        for path in &rule.paths {
            backends.push((rule.host.clone(), path.path.clone(), &path.backend));
        }
    }
    backends
}

fn default_listen_ports() -> Vec<ListenPort> {
    vec![ListenPort {
        protocol: Protocol::Http,
        port: 80,
    }]
}

struct Annotations<'a> {
    values: &'a BTreeMap<String, String>,
}

impl<'a> Annotations<'a> {
    fn new(spec: &'a IngressSpec) -> Self {
        Annotations {
            values: &spec.annotations,
        }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.values
            .get(&format!("{ANNOTATION_PREFIX}{key}"))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn scheme(&self) -> Result<Scheme, String> {
        match self.get(SCHEME) {
            None | Some("internal") => Ok(Scheme::Internal),
            Some("internet-facing") => Ok(Scheme::InternetFacing),
            Some(other) => Err(format!("invalid scheme '{other}'")),
        }
    }

    fn listen_ports(&self) -> Result<Vec<ListenPort>, String> {
        let Some(raw) = self.get(LISTEN_PORTS) else {
            return Ok(default_listen_ports());
        };

        let entries: Vec<BTreeMap<String, u16>> = serde_json::from_str(raw)
            .map_err(|e| format!("invalid {LISTEN_PORTS} annotation: {e}"))?;

        let mut ports = BTreeSet::new();
        for (protocol, port) in entries.into_iter().flatten() {
            let protocol = match protocol.as_str() {
                "HTTP" => Protocol::Http,
                "HTTPS" => Protocol::Https,
                other => return Err(format!("invalid listener protocol '{other}'")),
            };
            ports.insert(ListenPort { protocol, port });
        }

        if ports.is_empty() {
            return Err(format!("{LISTEN_PORTS} annotation declares no ports"));
        }
        Ok(ports.into_iter().collect())
    }

    fn tags(&self, problems: &mut Vec<String>) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        for pair in self.list(TAGS) {
            match pair.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    tags.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => problems.push(format!("invalid tag '{pair}'")),
            }
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{FakeServices, ingress};
    use crate::types::{HttpPath, IngressRule};

    fn naming() -> ResourceNaming {
        ResourceNaming::new("prod")
    }

    fn annotated(pairs: &[(&str, &str)]) -> IngressSpec {
        let mut spec = ingress("shop", "web", "web", 80);
        for (key, value) in pairs {
            spec.annotations
                .insert(format!("{ANNOTATION_PREFIX}{key}"), value.to_string());
        }
        spec
    }

    #[test]
    fn test_build_success() {
        let naming = naming();
        let services = FakeServices::new().node_port("shop", "web", 80, 30080);
        let builder = Builder::new(&naming, &services);

        let mut spec = annotated(&[
            ("scheme", "internet-facing"),
            ("listen-ports", r#"[{"HTTP":80},{"HTTPS":443}]"#),
            ("certificate-arn", "arn:cert"),
            ("subnets", "subnet-a, subnet-b"),
            ("tags", "team=web,env=prod"),
        ]);
        spec.rules.push(IngressRule {
            host: Some("shop.example.com".into()),
            paths: vec![HttpPath {
                path: Some("/".into()),
                backend: Backend {
                    service_name: "web".into(),
                    service_port: 80,
                },
            }],
        });

        let BuildOutcome::Built(entity) = builder.build(&spec) else {
            panic!("expected a built entity");
        };
        assert!(!entity.tainted);
        assert!(entity.load_balancers.is_empty());

        let state = entity.desired_state.unwrap();
        assert_eq!(state.scheme, Scheme::InternetFacing);
        assert_eq!(state.listen_ports.len(), 2);
        assert_eq!(state.subnets, vec!["subnet-a", "subnet-b"]);
        assert_eq!(state.tags.get("team").map(String::as_str), Some("web"));
        assert_eq!(state.hostnames, vec!["shop.example.com"]);
        assert_eq!(state.health_check_path, "/");
        assert_eq!(state.rules.len(), 2);
        assert!(state.rules.iter().all(|r| r.node_port == Some(30080)));
    }

    #[test]
    fn test_port_resolution_failures_taint() {
        let naming = naming();
        let services = FakeServices::new()
            .cluster_ip("shop", "internal", 80)
            .node_port("shop", "web", 80, 30080);
        let builder = Builder::new(&naming, &services);

        for (service, port, expected) in [
            ("missing", 80, "unable to find the shop/missing service"),
            ("internal", 80, "shop/internal service is not of type NodePort"),
            ("web", 81, "unable to find port 81 in the shop/web service"),
        ] {
            let spec = ingress("shop", "web", service, port);
            let BuildOutcome::Tainted(entity) = builder.build(&spec) else {
                panic!("expected a tainted entity for {service}:{port}");
            };
            assert!(entity.tainted);
            assert_eq!(entity.taint_reasons, vec![expected.to_string()]);
            // The partial state is kept for visibility.
            let state = entity.desired_state.unwrap();
            assert_eq!(state.rules[0].node_port, None);
            assert_eq!(state.rules[0].service, service);
        }
    }

    #[test]
    fn test_bad_annotations_taint_with_defaults() {
        let naming = naming();
        let services = FakeServices::new().node_port("shop", "web", 80, 30080);
        let builder = Builder::new(&naming, &services);

        let spec = annotated(&[
            ("scheme", "public"),
            ("listen-ports", "[80]"),
            ("tags", "ok=1,broken"),
        ]);
        let BuildOutcome::Tainted(entity) = builder.build(&spec) else {
            panic!("expected a tainted entity");
        };
        assert_eq!(entity.taint_reasons.len(), 3);
        let state = entity.desired_state.unwrap();
        assert_eq!(state.scheme, Scheme::Internal);
        assert_eq!(state.listen_ports, default_listen_ports());
        assert_eq!(state.tags.len(), 1);
    }

    #[test]
    fn test_https_without_certificate_taints() {
        let naming = naming();
        let services = FakeServices::new().node_port("shop", "web", 80, 30080);
        let builder = Builder::new(&naming, &services);

        let spec = annotated(&[("listen-ports", r#"[{"HTTPS":443}]"#)]);
        assert!(matches!(builder.build(&spec), BuildOutcome::Tainted(_)));
    }

    #[test]
    fn test_dropped_specs() {
        let naming = naming();
        let services = FakeServices::new();
        let builder = Builder::new(&naming, &services);

        let mut no_backend = ingress("shop", "web", "web", 80);
        no_backend.default_backend = None;
        no_backend.rules.push(IngressRule {
            host: Some("shop.example.com".into()),
            paths: vec![],
        });
        assert_eq!(
            builder.build(&no_backend),
            BuildOutcome::Dropped(DropReason::NoBackend)
        );

        let bad_name = ingress("Shop", "web", "web", 80);
        assert!(matches!(
            builder.build(&bad_name),
            BuildOutcome::Dropped(DropReason::Unnameable(_))
        ));
        assert_eq!(builder.build(&bad_name).into_entity(), None);
    }
}
