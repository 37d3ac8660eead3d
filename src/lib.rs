//! # Mi Exporter - Xiaomi MIoT Fleet Metrics
//!
//! Polls a Xiaomi account's devices on a fixed interval and exposes their
//! properties as labeled Prometheus gauges.
//!
//! ## Features
//!
//! - **Description paths**: properties are configured by human-readable names
//!   (`["Environment", "Temperature"]`) and resolved against each model's descriptor
//! - **Batched reads**: one property request per device per cycle
//! - **Failure isolation**: a failing device or model never stops the others
//! - **Scrape endpoint**: `/metrics` in the Prometheus text format
//! - **Library + Binary**: use the collectors with your own transport or run the binary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mi_exporter::{CloudConfig, CloudConnector, Context, PollLoop, ProfileSet, PrometheusSink};
//! use std::{sync::Arc, time::Duration};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = CloudConnector::new(CloudConfig::new(mi_exporter::default_token_path()))?;
//!     let sink = Arc::new(PrometheusSink::new()?);
//!
//!     let poller = PollLoop::new(Arc::new(Context::new()), connector, sink, Duration::from_secs(60))
//!         .with_profiles(&ProfileSet::builtin(), 1);
//!     poller.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

pub mod cloud;
pub mod error;
pub mod metrics;
pub mod miot;
pub mod web;

// Re-export public API
pub use cloud::{CloudConfig, CloudConnector, MiioService, SpecCatalog};
pub use error::{ExporterError, Result};
pub use metrics::{
    Collector, Context, MemorySink, MetricsSink, ModelProfile, PollLoop, ProfileSet,
    PrometheusSink, Sample, SampleLabels,
};
pub use miot::{DeviceRegistry, PropertyPath, SpecCache, SpecTree};
pub use web::{start_metrics_server, WebConfig};

/// The default polling interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// The default web server host
pub const DEFAULT_WEB_HOST: &str = "localhost";

/// File name of the persisted account token, relative to the home directory.
pub const TOKEN_FILE_NAME: &str = ".mi.token";

/// `~/.mi.token`, or `./.mi.token` when no home directory is known.
pub fn default_token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(TOKEN_FILE_NAME)
}
