pub mod api;
pub mod bootstrap;
pub mod builder;
pub mod cloud;
pub mod config;
pub mod controller;
pub mod diff;
pub mod dispatch;
pub mod dry_run;
pub mod identity;
pub mod manifest;
pub mod metrics_defs;
pub mod state;
pub mod types;

#[cfg(test)]
mod testutils;

use crate::api::AdminApiError;
use crate::config::{Cloud, Config};
use crate::controller::{Command, Controller, ControllerError};
use crate::dry_run::DryRunCloud;
use crate::identity::ResourceNaming;
use crate::manifest::ManifestSource;
use crate::state::StateStore;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    AdminApi(#[from] AdminApiError),
}

/// Runs the controller until it is interrupted or hits a fatal error.
pub async fn run(config: Config) -> Result<(), RunError> {
    config.validate().map_err(ControllerError::from)?;

    let naming = ResourceNaming::new(&config.cluster_name);
    let cloud = match config.cloud {
        Cloud::DryRun => Arc::new(DryRunCloud::new(naming)),
    };

    let store = Arc::new(StateStore::new());
    let controller = Controller::new(&config, cloud.clone(), cloud, store.clone());

    // Channel to send commands to the controller loop.
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(64);

    tokio::spawn(ManifestSource::new(&config.manifest).watch(cmd_tx.clone()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt, finishing the current cycle");
            let _ = cmd_tx.send(Command::Shutdown).await;
        }
    });

    tokio::select! {
        result = controller.run(cmd_rx) => result?,
        result = api::serve(config.admin_listener.clone(), store) => result?,
    }
    Ok(())
}
