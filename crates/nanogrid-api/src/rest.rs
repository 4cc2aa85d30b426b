//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Read-out surface for polled readings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nanogrid_core::{project, Catalog, CycleReport, ReadingEntity, ReadingStore, UNIQUE_ID_PREFIX};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Summary returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSnapshot {
    /// Number of readings in the catalog.
    pub readings: usize,
    /// Readings currently holding a known value.
    pub known: usize,
    /// Duration of the latest completed cycle in milliseconds.
    pub last_cycle_ms: Option<u64>,
    /// Failed polls in the latest completed cycle.
    pub last_cycle_failures: Option<usize>,
}

/// Supplies entity snapshots to the REST handlers.
pub trait ReadingsProvider: Send + Sync + 'static {
    /// All entities in catalog order.
    fn entities(&self) -> Vec<ReadingEntity>;

    /// Most recent cycle report, if a cycle has completed.
    fn last_report(&self) -> Option<CycleReport> {
        None
    }
}

/// Provider backed by a catalog and the live reading store.
pub struct StoreReadingsProvider {
    catalog: Arc<Catalog>,
    store: Arc<ReadingStore>,
    reports: Option<watch::Receiver<Option<CycleReport>>>,
}

impl StoreReadingsProvider {
    /// Build a provider over the shared catalog and store.
    pub fn new(catalog: Arc<Catalog>, store: Arc<ReadingStore>) -> Self {
        Self {
            catalog,
            store,
            reports: None,
        }
    }

    /// Attach the scheduler's report channel so `/health` can describe the last cycle.
    pub fn with_reports(mut self, reports: watch::Receiver<Option<CycleReport>>) -> Self {
        self.reports = Some(reports);
        self
    }
}

impl ReadingsProvider for StoreReadingsProvider {
    fn entities(&self) -> Vec<ReadingEntity> {
        project(&self.catalog, &self.store)
    }

    fn last_report(&self) -> Option<CycleReport> {
        self.reports.as_ref().and_then(|rx| rx.borrow().clone())
    }
}

/// Builder used to configure and spawn the REST API server.
#[derive(Clone)]
pub struct RestApiBuilder {
    listen: SocketAddr,
    provider: Arc<dyn ReadingsProvider>,
}

impl RestApiBuilder {
    /// Construct a new builder.
    pub fn new(listen: SocketAddr, provider: Arc<dyn ReadingsProvider>) -> Self {
        Self { listen, provider }
    }

    /// Spawn the REST API server and return a handle that can be awaited for shutdown.
    pub async fn spawn(self) -> anyhow::Result<RestApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "rest api listening");

        let router = Router::new()
            .route("/readings", get(list_readings))
            .route("/readings/:id", get(get_reading))
            .route("/health", get(get_health))
            .with_state(self.provider);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "rest api server exited with error");
            }
        });

        Ok(RestApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`RestApiBuilder::spawn`].
pub struct RestApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl RestApiHandle {
    /// Retrieve the socket address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(anyhow::Error::new)
    }
}

type SharedProvider = Arc<dyn ReadingsProvider>;

async fn list_readings(State(provider): State<SharedProvider>) -> Json<Vec<ReadingEntity>> {
    Json(provider.entities())
}

async fn get_reading(State(provider): State<SharedProvider>, Path(id): Path<String>) -> Response {
    let unique_id = if id.starts_with(UNIQUE_ID_PREFIX) {
        id.clone()
    } else {
        format!("{UNIQUE_ID_PREFIX}{id}")
    };
    match provider
        .entities()
        .into_iter()
        .find(|entity| entity.unique_id == unique_id)
    {
        Some(entity) => Json(entity).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown reading '{id}'") })),
        )
            .into_response(),
    }
}

async fn get_health(State(provider): State<SharedProvider>) -> Json<HealthSnapshot> {
    let entities = provider.entities();
    let report = provider.last_report();
    Json(HealthSnapshot {
        readings: entities.len(),
        known: entities.iter().filter(|e| e.state.is_known()).count(),
        last_cycle_ms: report.as_ref().map(|r| r.duration.as_millis() as u64),
        last_cycle_failures: report.as_ref().map(CycleReport::failed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanogrid_core::{ReadingValue, Scalar};
    use reqwest::Client;
    use serde_json::Value;

    fn provider() -> Arc<StoreReadingsProvider> {
        let catalog = Arc::new(Catalog::builtin());
        let store = Arc::new(ReadingStore::for_catalog(&catalog));
        store.set(
            "chargebox_state",
            ReadingValue::Known(Scalar::String("CONNECTED".into())),
        );
        Arc::new(StoreReadingsProvider::new(catalog, store))
    }

    #[tokio::test]
    async fn readings_endpoints_expose_entities() {
        let handle = RestApiBuilder::new("127.0.0.1:0".parse().unwrap(), provider())
            .spawn()
            .await
            .unwrap();
        let client = Client::new();
        let base = format!("http://{}", handle.local_addr());

        let all: Vec<ReadingEntity> = client
            .get(format!("{base}/readings"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.len(), 22);

        let by_id: Value = client
            .get(format!("{base}/readings/chargebox_state"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(by_id["state"], "CONNECTED");
        assert_eq!(by_id["unique_id"], "ctek_nanogrid_air_chargebox_state");

        let by_unique_id = client
            .get(format!("{base}/readings/ctek_nanogrid_air_chargebox_state"))
            .send()
            .await
            .unwrap();
        assert_eq!(by_unique_id.status(), StatusCode::OK);

        let missing = client
            .get(format!("{base}/readings/solar_yield"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let health: HealthSnapshot = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.readings, 22);
        assert_eq!(health.known, 1);
        assert_eq!(health.last_cycle_ms, None);

        drop(client);
        handle.shutdown().await.unwrap();
    }
}
