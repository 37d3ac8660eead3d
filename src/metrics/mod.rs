//! Device metrics collection.
//!
//! This module turns resolved description paths into batched property reads and
//! publishes the results as labeled gauges. A [`PollLoop`] drives one [`Collector`]
//! per configured model on a fixed interval.

pub mod collector;
pub mod data;
pub mod poller;
pub mod profile;
pub mod sink;
pub mod traits;

// Re-export commonly used items
pub use collector::Collector;
pub use data::{coerce_value, CollectReport, CycleReport, Sample, SampleLabels};
pub use poller::{Context, PollLoop, PollState, PollSummary};
pub use profile::{ModelProfile, ProfileSet};
pub use sink::{MemorySink, MetricsSink, PrometheusSink};
pub use traits::{DeviceDirectory, MiotService, PropertyReader, SessionFactory, SpecSource};
