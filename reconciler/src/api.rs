use crate::config::Listener as ListenerConfig;
use crate::state::{FleetState, StateStore};
use crate::types::{Identity, TrackedEntity};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum AdminApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub async fn serve(listener: ListenerConfig, store: Arc<StateStore>) -> Result<(), AdminApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    tracing::info!(%addr, "Starting admin API");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(store)).await?;
    Ok(())
}

pub fn router(store: Arc<StateStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/state", get(fleet_state))
        .route("/state/{namespace}/{name}", get(entity_state))
        .with_state(store)
}

#[derive(thiserror::Error, Debug)]
enum QueryError {
    #[error("bootstrap has not completed")]
    NotReady,
    #[error("no tracked entity for {0}")]
    UnknownEntity(Identity),
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match self {
            QueryError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::UnknownEntity(_) => StatusCode::NOT_FOUND,
        };

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(store): State<Arc<StateStore>>) -> Result<&'static str, QueryError> {
    if store.is_initialized() {
        Ok("ready")
    } else {
        Err(QueryError::NotReady)
    }
}

async fn fleet_state(
    State(store): State<Arc<StateStore>>,
) -> Result<Json<Arc<FleetState>>, QueryError> {
    store.snapshot().map(Json).ok_or(QueryError::NotReady)
}

async fn entity_state(
    State(store): State<Arc<StateStore>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<TrackedEntity>, QueryError> {
    let state = store.snapshot().ok_or(QueryError::NotReady)?;
    let identity = Identity::new(namespace, name);

    state
        .entities
        .get(&identity)
        .cloned()
        .map(Json)
        .ok_or(QueryError::UnknownEntity(identity))
}
