//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Concurrent poll cycle across the reading catalog."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use nanogrid_common::config::FetchMode;
use nanogrid_metrics::PollMetrics;
use serde::Serialize;
use tracing::info;

use crate::catalog::Catalog;
use crate::error::Diagnostic;
use crate::poller::{PollOutcome, Poller};
use crate::store::ReadingStore;

/// Summary of one completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub known: usize,
    pub unknown: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl CycleReport {
    pub fn failed(&self) -> usize {
        self.diagnostics.len()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Polls every catalog reading concurrently and writes results to the store.
#[derive(Clone)]
pub struct PollCycle {
    catalog: Arc<Catalog>,
    poller: Poller,
    store: Arc<ReadingStore>,
    mode: FetchMode,
    metrics: Option<PollMetrics>,
}

impl PollCycle {
    pub fn new(
        catalog: Arc<Catalog>,
        poller: Poller,
        store: Arc<ReadingStore>,
        mode: FetchMode,
    ) -> Self {
        Self {
            catalog,
            poller,
            store,
            mode,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PollMetrics) -> Self {
        self.poller = self.poller.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub async fn run(&self) -> CycleReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let outcomes = match self.mode {
            FetchMode::PerReading => self.poll_per_reading().await,
            FetchMode::PerEndpoint => self.poll_per_endpoint().await,
        };

        let mut diagnostics = Vec::new();
        for (id, outcome) in outcomes {
            self.store.set(&id, outcome.value);
            diagnostics.extend(outcome.diagnostic);
        }

        let known = self.store.known_count();
        let report = CycleReport {
            started_at,
            duration: clock.elapsed(),
            known,
            unknown: self.catalog.len().saturating_sub(known),
            diagnostics,
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_cycle(report.known);
        }
        info!(
            mode = ?self.mode,
            known = report.known,
            unknown = report.unknown,
            failed = report.failed(),
            duration_ms = report.duration.as_millis() as u64,
            "poll cycle complete"
        );
        report
    }

    async fn poll_per_reading(&self) -> Vec<(String, PollOutcome)> {
        let polls = self.catalog.iter().map(|descriptor| async move {
            (descriptor.id.clone(), self.poller.poll(descriptor).await)
        });
        join_all(polls).await
    }

    async fn poll_per_endpoint(&self) -> Vec<(String, PollOutcome)> {
        let endpoints = self.catalog.endpoints();
        let fetches = endpoints.iter().map(|endpoint| async move {
            (endpoint.clone(), self.poller.fetch(endpoint).await)
        });
        let documents: HashMap<_, _> = join_all(fetches).await.into_iter().collect();

        self.catalog
            .iter()
            .filter_map(|descriptor| {
                let fetched = documents.get(&descriptor.endpoint)?;
                Some((descriptor.id.clone(), self.poller.resolve(descriptor, fetched)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReadingDescriptor;
    use crate::error::PollError;
    use crate::reading::{ReadingValue, Scalar};
    use crate::source::InMemoryDocumentSource;
    use serde_json::json;

    fn meter_catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_descriptors([
                ReadingDescriptor::new("active_power_in", "Active Power In", "/meter", "activePowerIn"),
                ReadingDescriptor::new("current_phase_1", "Current Phase 1", "/meter", "current.0"),
                ReadingDescriptor::new("current_phase_3", "Current Phase 3", "/meter", "current.2"),
                ReadingDescriptor::new("charger_serial", "Charger Serial", "/evse", "cb_id"),
            ])
            .unwrap(),
        )
    }

    fn cycle(source: Arc<InMemoryDocumentSource>, mode: FetchMode) -> PollCycle {
        let catalog = meter_catalog();
        let store = Arc::new(ReadingStore::for_catalog(&catalog));
        PollCycle::new(catalog, Poller::new(source), store, mode)
    }

    fn seeded_source() -> Arc<InMemoryDocumentSource> {
        let source = Arc::new(InMemoryDocumentSource::new());
        source.set_document("/meter", json!({"activePowerIn": 3450, "current": [5.1, 4.9]}));
        source.set_failure("/evse", PollError::transport("connection reset"));
        source
    }

    #[tokio::test]
    async fn per_endpoint_mode_fetches_each_endpoint_once() {
        let source = seeded_source();
        let cycle = cycle(source.clone(), FetchMode::PerEndpoint);
        let report = cycle.run().await;

        assert_eq!(source.fetch_count(), 2);
        assert_eq!(report.known, 2);
        assert_eq!(report.unknown, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.diagnostics[0].reading_id, "charger_serial");
        assert_eq!(
            cycle.store().get("current_phase_1"),
            Some(ReadingValue::Known(Scalar::Number(serde_json::Number::from_f64(5.1).unwrap())))
        );
        assert_eq!(cycle.store().get("current_phase_3"), Some(ReadingValue::Unknown));
    }

    #[tokio::test]
    async fn per_reading_mode_matches_per_endpoint_results() {
        let per_reading = cycle(seeded_source(), FetchMode::PerReading);
        let per_endpoint = cycle(seeded_source(), FetchMode::PerEndpoint);
        per_reading.run().await;
        per_endpoint.run().await;
        assert_eq!(per_reading.store().snapshot(), per_endpoint.store().snapshot());
    }

    #[tokio::test]
    async fn per_reading_mode_fetches_for_every_descriptor() {
        let source = seeded_source();
        cycle(source.clone(), FetchMode::PerReading).run().await;
        assert_eq!(source.fetch_count(), 4);
    }

    #[tokio::test]
    async fn failing_endpoint_clears_previous_value() {
        let source = seeded_source();
        let cycle = cycle(source.clone(), FetchMode::PerEndpoint);
        cycle.run().await;
        assert!(cycle.store().get("active_power_in").unwrap().is_known());

        source.set_failure(
            "/meter",
            PollError::Timeout {
                url: "memory:///meter/".into(),
            },
        );
        let report = cycle.run().await;
        assert_eq!(cycle.store().get("active_power_in"), Some(ReadingValue::Unknown));
        assert_eq!(report.known, 0);
        assert_eq!(report.failed(), 4);
    }

    #[tokio::test]
    async fn repeated_cycles_are_idempotent() {
        let cycle = cycle(seeded_source(), FetchMode::PerEndpoint);
        cycle.run().await;
        let first = cycle.store().snapshot();
        cycle.run().await;
        assert_eq!(cycle.store().snapshot(), first);
    }

    #[tokio::test]
    async fn report_serialises_duration_in_millis() {
        let report = cycle(seeded_source(), FetchMode::PerEndpoint).run().await;
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["duration"].is_u64());
        assert_eq!(value["diagnostics"][0]["error"]["kind"], "transport");
    }
}
