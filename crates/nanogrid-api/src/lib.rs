//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Read-out surface for polled readings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! REST read-out of the reading entities produced by the poller.
#![warn(missing_docs)]

pub mod rest;

pub use rest::{
    HealthSnapshot, ReadingsProvider, RestApiBuilder, RestApiHandle, StoreReadingsProvider,
};
