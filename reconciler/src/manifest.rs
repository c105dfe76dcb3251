//! File backed ingress source. The manifest lists every ingress and service; each
//! poll delivers the complete list to the controller.
use crate::cloud::{PortResolver, ResolveError};
use crate::controller::Command;
use crate::types::{IngressSpec, ServiceSpec, ServiceType};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("could not read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Deserialize, Debug, Default)]
struct ManifestFile {
    #[serde(default)]
    ingresses: Vec<IngressSpec>,
    #[serde(default)]
    services: Vec<ServiceSpec>,
}

/// Services by `<namespace>/<name>`.
#[derive(Clone, Debug, Default)]
pub struct ServiceCatalog {
    services: HashMap<String, ServiceSpec>,
}

impl ServiceCatalog {
    pub fn new(services: Vec<ServiceSpec>) -> Self {
        ServiceCatalog {
            services: services
                .into_iter()
                .map(|s| (format!("{}/{}", s.namespace, s.name), s))
                .collect(),
        }
    }
}

impl PortResolver for ServiceCatalog {
    fn resolve_node_port(&self, service_key: &str, backend_port: i32) -> Result<i32, ResolveError> {
        let service = self
            .services
            .get(service_key)
            .ok_or_else(|| ResolveError::NotFound(service_key.to_string()))?;

        if service.r#type != ServiceType::NodePort {
            return Err(ResolveError::WrongType(service_key.to_string()));
        }

        service
            .ports
            .iter()
            .find(|p| p.port == backend_port)
            .and_then(|p| p.node_port)
            .ok_or_else(|| ResolveError::PortNotFound {
                service: service_key.to_string(),
                port: backend_port,
            })
    }
}

/// The complete set of ingresses and the services they may reference, as of one
/// notification.
#[derive(Clone, Debug, Default)]
pub struct ClusterSnapshot {
    pub ingresses: Vec<IngressSpec>,
    pub services: ServiceCatalog,
}

impl ClusterSnapshot {
    pub fn new(ingresses: Vec<IngressSpec>, services: Vec<ServiceSpec>) -> Self {
        ClusterSnapshot {
            ingresses,
            services: ServiceCatalog::new(services),
        }
    }
}

pub struct ManifestSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl ManifestSource {
    pub fn new(config: &crate::config::Manifest) -> Self {
        ManifestSource {
            path: config.path.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    pub fn load(&self) -> Result<ClusterSnapshot, ManifestError> {
        let file = File::open(&self.path)?;
        let manifest: ManifestFile = serde_yaml::from_reader(file)?;
        Ok(ClusterSnapshot::new(manifest.ingresses, manifest.services))
    }

    /// Sends a snapshot to the controller on every poll until the controller
    /// goes away.
    ///
    /// A manifest that cannot be read skips the poll. Sending an empty snapshot
    /// instead would tear down every load balancer.
    pub async fn watch(self, tx: mpsc::Sender<Command>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let snapshot = match self.load() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(path = ?self.path, error = %e, "Skipping manifest poll");
                    continue;
                }
            };

            if tx.send(Command::Sync(snapshot)).await.is_err() {
                tracing::debug!("Controller stopped, ending manifest watch");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServicePort;
    use std::io::Write;

    const MANIFEST: &str = r#"
ingresses:
  - namespace: shop
    name: web
    annotations:
      kubernetes.io/ingress.class: alb
    default_backend: {service_name: web, service_port: 80}
    rules:
      - host: shop.example.com
        paths:
          - path: /api
            backend: {service_name: api, service_port: 8080}
services:
  - namespace: shop
    name: web
    type: NodePort
    ports:
      - {port: 80, node_port: 30080}
  - namespace: shop
    name: api
    type: ClusterIP
    ports:
      - {port: 8080}
"#;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");
        tmp
    }

    fn source(tmp: &tempfile::NamedTempFile) -> ManifestSource {
        ManifestSource::new(&crate::config::Manifest {
            path: tmp.path().to_path_buf(),
            poll_interval_secs: 1,
        })
    }

    #[test]
    fn test_load_manifest() {
        let tmp = write_tmp_file(MANIFEST);
        let snapshot = source(&tmp).load().unwrap();

        assert_eq!(snapshot.ingresses.len(), 1);
        let web = &snapshot.ingresses[0];
        assert_eq!(web.rules[0].paths[0].backend.service_port, 8080);
        assert_eq!(
            snapshot.services.resolve_node_port("shop/web", 80),
            Ok(30080)
        );
        assert_eq!(
            snapshot.services.resolve_node_port("shop/api", 8080),
            Err(ResolveError::WrongType("shop/api".into()))
        );
    }

    #[test]
    fn test_load_errors() {
        let tmp = write_tmp_file("ingresses: [not, an, ingress]");
        assert!(matches!(source(&tmp).load(), Err(ManifestError::Parse(_))));

        let missing = ManifestSource::new(&crate::config::Manifest {
            path: "/nonexistent/manifest.yaml".into(),
            poll_interval_secs: 1,
        });
        assert!(matches!(missing.load(), Err(ManifestError::Io(_))));
    }

    #[test]
    fn test_resolve_node_port() {
        let catalog = ServiceCatalog::new(vec![ServiceSpec {
            namespace: "ns".into(),
            name: "svc".into(),
            r#type: ServiceType::NodePort,
            ports: vec![
                ServicePort {
                    port: 80,
                    node_port: Some(30001),
                },
                ServicePort {
                    port: 443,
                    node_port: None,
                },
            ],
        }]);

        assert_eq!(catalog.resolve_node_port("ns/svc", 80), Ok(30001));
        assert_eq!(
            catalog.resolve_node_port("ns/other", 80),
            Err(ResolveError::NotFound("ns/other".into()))
        );
        assert_eq!(
            catalog.resolve_node_port("ns/svc", 8080),
            Err(ResolveError::PortNotFound {
                service: "ns/svc".into(),
                port: 8080
            })
        );
        assert!(catalog.resolve_node_port("ns/svc", 443).is_err());
    }

    #[tokio::test]
    async fn test_watch_sends_snapshots() {
        let tmp = write_tmp_file(MANIFEST);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = tokio::spawn(source(&tmp).watch(tx));

        // The first tick fires immediately.
        match rx.recv().await {
            Some(Command::Sync(snapshot)) => assert_eq!(snapshot.ingresses.len(), 1),
            other => panic!("unexpected command {other:?}"),
        }

        drop(rx);
        handle.await.unwrap();
    }
}
