//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the polling runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the Nanogrid Air workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the poller, the read-out API and the daemon.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, DeviceConfig, FetchMode, LoadedAppConfig, LoggingConfig, MetricsConfig,
    PollingConfig, ReadingConfig,
};
pub use logging::{init_tracing, LogFormat};
