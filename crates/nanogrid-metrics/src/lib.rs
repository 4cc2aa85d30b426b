//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Registry shared between the poll cycle and the exporter.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Bind `addr` and serve the registry on `/metrics` until shut down.
///
/// Binding port 0 picks a free port; [`MetricsServer::addr`] reports it.
pub async fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    let addr = listener
        .local_addr()
        .context("failed to resolve metrics listener address")?;
    let router = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(registry);

    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            warn!(error = %err, "metrics exporter exited with error");
        }
    });
    info!(address = %addr, "metrics exporter listening");

    Ok(MetricsServer {
        addr,
        shutdown,
        task,
    })
}

async fn render_metrics(State(registry): State<SharedRegistry>) -> Response {
    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Running `/metrics` exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for the server task.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.context("metrics exporter task failed")
    }
}

/// Counters and histograms recorded by the poll cycle.
#[derive(Clone, Debug)]
pub struct PollMetrics {
    registry: SharedRegistry,
    polls: IntCounterVec,
    fetch_seconds: HistogramVec,
    readings_known: IntGauge,
    cycles: IntCounter,
}

impl PollMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let polls = IntCounterVec::new(
            Opts::new(
                "nanogrid_polls_total",
                "Poll attempts by reading and outcome (extracted, absent, status, timeout, transport, decode)",
            ),
            &["reading", "outcome"],
        )?;
        registry.register(Box::new(polls.clone()))?;

        let buckets = prometheus::exponential_buckets(0.005, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let fetch_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nanogrid_fetch_seconds",
                "Latency of endpoint document fetches",
            )
            .buckets(buckets),
            &["endpoint"],
        )?;
        registry.register(Box::new(fetch_seconds.clone()))?;

        let readings_known = IntGauge::with_opts(Opts::new(
            "nanogrid_readings_known",
            "Readings holding a known value after the latest cycle",
        ))?;
        registry.register(Box::new(readings_known.clone()))?;

        let cycles = IntCounter::with_opts(Opts::new(
            "nanogrid_poll_cycles_total",
            "Completed poll cycles",
        ))?;
        registry.register(Box::new(cycles.clone()))?;

        Ok(Self {
            registry,
            polls,
            fetch_seconds,
            readings_known,
            cycles,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_poll(&self, reading: &str, outcome: &str) {
        self.polls.with_label_values(&[reading, outcome]).inc();
    }

    pub fn observe_fetch(&self, endpoint: &str, elapsed: Duration) {
        self.fetch_seconds
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_cycle(&self, known: usize) {
        self.cycles.inc();
        self.readings_known.set(known as i64);
    }

    pub fn poll_count(&self, reading: &str, outcome: &str) -> u64 {
        self.polls.with_label_values(&[reading, outcome]).get()
    }
}

/// Register a constant `nanogrid_build_info` gauge.
pub fn register_build_info(registry: &Registry, version: &str, service: &str) -> Result<()> {
    let build_info = GaugeVec::new(
        Opts::new("nanogrid_build_info", "Build metadata for the running binary"),
        &["version", "service"],
    )?;
    registry.register(Box::new(build_info.clone()))?;
    build_info.with_label_values(&[version, service]).set(1.0);
    Ok(())
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_metrics_track_outcomes() {
        let metrics = PollMetrics::new(new_registry()).unwrap();
        metrics.record_poll("wifi_rssi", "extracted");
        metrics.record_poll("wifi_rssi", "extracted");
        metrics.record_poll("wifi_rssi", "timeout");
        metrics.observe_fetch("/status", Duration::from_millis(12));
        metrics.record_cycle(21);

        assert_eq!(metrics.poll_count("wifi_rssi", "extracted"), 2);
        assert_eq!(metrics.poll_count("wifi_rssi", "timeout"), 1);
        assert_eq!(metrics.poll_count("wifi_rssi", "status"), 0);

        let names: Vec<String> = metrics
            .registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();
        assert!(names.contains(&"nanogrid_polls_total".to_owned()));
        assert!(names.contains(&"nanogrid_readings_known".to_owned()));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = new_registry();
        PollMetrics::new(registry.clone()).unwrap();
        assert!(PollMetrics::new(registry).is_err());
    }

    #[tokio::test]
    async fn exporter_serves_registry() {
        let registry = new_registry();
        register_build_info(&registry, "0.1.0", "nanogridd").unwrap();
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let body = reqwest::get(format!("http://{}/metrics", server.addr()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("nanogrid_build_info"));

        server.shutdown().await.unwrap();
    }
}
