//! Metric sinks the collectors write samples into.

use crate::error::Result;
use crate::metrics::data::SampleLabels;
use prometheus::{CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;

/// Destination for device samples and exporter bookkeeping.
///
/// Gauge writes are upserts keyed by the full label set.
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, labels: &SampleLabels, value: f64);

    /// Record the outcome of one polling cycle.
    fn record_cycle(&self, _succeeded: bool) {}

    /// Record a failed batched read for a device of `model`.
    fn record_device_error(&self, _model: &str) {}
}

/// Prometheus registry holding device status gauges and exporter counters.
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    device_status: GaugeVec,
    cycles_total: CounterVec,
    device_read_errors_total: CounterVec,
    last_cycle_timestamp: Gauge,
}

impl PrometheusSink {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let device_status = GaugeVec::new(
            Opts::new("mi_device_status", "Mi device status"),
            &SampleLabels::NAMES,
        )?;
        registry.register(Box::new(device_status.clone()))?;

        let cycles_total = CounterVec::new(
            Opts::new("mi_exporter_cycles_total", "Polling cycles by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let device_read_errors_total = CounterVec::new(
            Opts::new(
                "mi_exporter_device_read_errors_total",
                "Failed batched property reads",
            ),
            &["model"],
        )?;
        registry.register(Box::new(device_read_errors_total.clone()))?;

        let last_cycle_timestamp = Gauge::new(
            "mi_exporter_last_cycle_timestamp_seconds",
            "Unix time at which the last polling cycle finished",
        )?;
        registry.register(Box::new(last_cycle_timestamp.clone()))?;

        Ok(Self {
            registry,
            device_status,
            cycles_total,
            device_read_errors_total,
            last_cycle_timestamp,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all registered metrics in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|err| prometheus::Error::Msg(err.to_string()).into())
    }

    /// Content type of [`PrometheusSink::render`] output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl MetricsSink for PrometheusSink {
    fn set_gauge(&self, labels: &SampleLabels, value: f64) {
        self.device_status
            .with_label_values(&labels.values())
            .set(value);
    }

    fn record_cycle(&self, succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "failed" };
        self.cycles_total.with_label_values(&[outcome]).inc();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        self.last_cycle_timestamp.set(now.as_secs_f64());
    }

    fn record_device_error(&self, model: &str) {
        self.device_read_errors_total
            .with_label_values(&[model])
            .inc();
    }
}

/// In-memory sink, mostly useful to inspect what a collector emitted.
#[derive(Debug, Default)]
pub struct MemorySink {
    gauges: Mutex<HashMap<SampleLabels, f64>>,
    cycles: Mutex<Vec<bool>>,
    device_errors: Mutex<HashMap<String, usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, labels: &SampleLabels) -> Option<f64> {
        self.gauges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(labels)
            .copied()
    }

    /// Value of the series for device `did` and lower-cased `key`.
    pub fn value_of(&self, did: &str, key: &str) -> Option<f64> {
        self.gauges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|(labels, _)| labels.did == did && labels.key == key)
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.gauges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outcomes of recorded cycles, oldest first.
    pub fn cycles(&self) -> Vec<bool> {
        self.cycles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn device_errors(&self, model: &str) -> usize {
        self.device_errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(model)
            .copied()
            .unwrap_or(0)
    }
}

impl MetricsSink for MemorySink {
    fn set_gauge(&self, labels: &SampleLabels, value: f64) {
        self.gauges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(labels.clone(), value);
    }

    fn record_cycle(&self, succeeded: bool) {
        self.cycles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(succeeded);
    }

    fn record_device_error(&self, model: &str) {
        *self
            .device_errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(model.to_string())
            .or_insert(0) += 1;
    }
}
