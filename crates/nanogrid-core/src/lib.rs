//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Generic JSON-path polling client."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Polling client for the CTEK Nanogrid Air HTTP API.
//!
//! Readings are described by an immutable [`ReadingDescriptor`] (endpoint plus
//! dotted JSON path). A [`Poller`] fetches the endpoint document from a
//! [`DocumentSource`] and extracts the path; network, status and decode
//! failures are logged and collapse to [`ReadingValue::Unknown`] so one bad
//! reading never stops the others. [`PollCycle`] runs every reading
//! concurrently and [`PollScheduler`] repeats cycles on an interval.

pub mod catalog;
pub mod cycle;
pub mod entity;
pub mod error;
pub mod path;
pub mod poller;
pub mod reading;
pub mod scheduler;
pub mod source;
pub mod store;

pub use catalog::{Catalog, CatalogError, Endpoint, ReadingDescriptor, UNIQUE_ID_PREFIX};
pub use cycle::{CycleReport, PollCycle};
pub use entity::{project, ReadingEntity};
pub use error::{Diagnostic, PollError};
pub use path::{extract, JsonPath};
pub use poller::{PollOutcome, Poller};
pub use reading::{ReadingValue, Scalar};
pub use scheduler::{PollScheduler, SchedulerHandle};
pub use source::{endpoint_url, DocumentSource, HttpDocumentSource, InMemoryDocumentSource};
pub use store::ReadingStore;
