use crate::dispatch::DispatchLimits;
use crate::identity::{MAX_CLUSTER_NAME_LEN, is_dns_label};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("A cluster name must be defined")]
    EmptyClusterName,

    #[error("Cluster name must be {MAX_CLUSTER_NAME_LEN} characters or less")]
    ClusterNameTooLong,

    #[error("Cluster name must be a lowercase DNS label: {0}")]
    InvalidClusterName(String),

    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("{0} cannot be 0")]
    ZeroValue(&'static str),

    #[error("Convergence unit timeout exceeds the dispatch deadline")]
    UnitTimeoutExceedsDeadline,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// The development ingress source: a YAML file with ingresses and services.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Manifest {
    pub path: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Bootstrap {
    pub max_concurrency: usize,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Bootstrap {
            max_concurrency: 16,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Convergence {
    pub max_concurrency: usize,
    pub unit_timeout_secs: u64,
    pub dispatch_deadline_secs: u64,
}

impl Default for Convergence {
    fn default() -> Self {
        Convergence {
            max_concurrency: 16,
            unit_timeout_secs: 300,
            dispatch_deadline_secs: 900,
        }
    }
}

impl Convergence {
    pub fn limits(&self) -> DispatchLimits {
        DispatchLimits {
            max_concurrency: self.max_concurrency,
            unit_timeout: Duration::from_secs(self.unit_timeout_secs),
            deadline: Duration::from_secs(self.dispatch_deadline_secs),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum Cloud {
    /// Keeps load balancers in memory and only logs what it would change.
    DryRun,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub cluster_name: String,
    /// Only ingresses with this class annotation are managed. Empty manages all.
    #[serde(default)]
    pub ingress_class: String,
    #[serde(default)]
    pub admin_listener: Listener,
    pub manifest: Manifest,
    #[serde(default)]
    pub bootstrap: Bootstrap,
    #[serde(default)]
    pub convergence: Convergence,
    pub cloud: Cloud,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cluster_name.is_empty() {
            return Err(ValidationError::EmptyClusterName);
        }
        if self.cluster_name.len() > MAX_CLUSTER_NAME_LEN {
            return Err(ValidationError::ClusterNameTooLong);
        }
        if !is_dns_label(&self.cluster_name) {
            return Err(ValidationError::InvalidClusterName(self.cluster_name.clone()));
        }

        self.admin_listener.validate()?;

        if self.manifest.poll_interval_secs == 0 {
            return Err(ValidationError::ZeroValue("manifest.poll_interval_secs"));
        }
        if self.bootstrap.max_concurrency == 0 {
            return Err(ValidationError::ZeroValue("bootstrap.max_concurrency"));
        }
        if self.convergence.max_concurrency == 0 {
            return Err(ValidationError::ZeroValue("convergence.max_concurrency"));
        }
        if self.convergence.unit_timeout_secs == 0 {
            return Err(ValidationError::ZeroValue("convergence.unit_timeout_secs"));
        }
        if self.convergence.unit_timeout_secs > self.convergence.dispatch_deadline_secs {
            return Err(ValidationError::UnitTimeoutExceedsDeadline);
        }

        Ok(())
    }
}
