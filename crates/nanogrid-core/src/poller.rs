//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fetch-and-extract cycle for a single reading."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use nanogrid_metrics::PollMetrics;
use serde_json::Value;
use tracing::{debug, Instrument};

use crate::catalog::{Endpoint, ReadingDescriptor};
use crate::error::{Diagnostic, PollError};
use crate::reading::ReadingValue;
use crate::source::DocumentSource;

/// Result of one poll: always a value, plus the diagnostic when the fetch failed.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub value: ReadingValue,
    pub diagnostic: Option<Diagnostic>,
}

impl PollOutcome {
    /// Metrics label: `extracted`, `absent`, or the failure kind.
    pub fn label(&self) -> &'static str {
        match (&self.diagnostic, &self.value) {
            (Some(diagnostic), _) => diagnostic.error.kind(),
            (None, ReadingValue::Known(_)) => "extracted",
            (None, ReadingValue::Unknown) => "absent",
        }
    }
}

/// Performs fetch-and-extract attempts against a [`DocumentSource`].
#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn DocumentSource>,
    metrics: Option<PollMetrics>,
}

impl Poller {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self {
            source,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PollMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fetch the descriptor's endpoint and extract its path. Never fails.
    pub async fn poll(&self, descriptor: &ReadingDescriptor) -> PollOutcome {
        let span = tracing::debug_span!("poll", reading = %descriptor.id, endpoint = %descriptor.endpoint);
        let fetched = self.fetch(&descriptor.endpoint).instrument(span).await;
        self.resolve(descriptor, &fetched)
    }

    /// Fetch one endpoint document, timing it when metrics are attached.
    pub async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, PollError> {
        let started = Instant::now();
        let result = self.source.fetch(endpoint).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_fetch(endpoint.as_str(), started.elapsed());
        }
        result
    }

    /// Turn a fetch result into the descriptor's outcome, logging any failure.
    pub fn resolve(
        &self,
        descriptor: &ReadingDescriptor,
        fetched: &Result<Value, PollError>,
    ) -> PollOutcome {
        let outcome = match fetched {
            Ok(document) => {
                let value = ReadingValue::from_extracted(descriptor.path.resolve(document));
                if !value.is_known() {
                    debug!(reading = %descriptor.id, path = %descriptor.path, "path absent in document");
                }
                PollOutcome {
                    value,
                    diagnostic: None,
                }
            }
            Err(error) => {
                let diagnostic = Diagnostic::new(descriptor.id.clone(), error.clone());
                diagnostic.emit();
                PollOutcome {
                    value: ReadingValue::Unknown,
                    diagnostic: Some(diagnostic),
                }
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_poll(&descriptor.id, outcome.label());
        }
        outcome
    }
}
