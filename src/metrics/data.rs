//! Data structures for collected device metrics.

use crate::miot::device::DeviceInfo;
use serde::{Deserialize, Serialize};

/// Label set identifying one device property series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleLabels {
    /// Device name as set in the app
    pub name: String,
    /// Device identifier
    pub did: String,
    /// Device model
    pub model: String,
    /// Lower-cased description path, e.g. `air purifier/switch status`
    pub key: String,
}

impl SampleLabels {
    /// Labels for one property of one device.
    pub fn for_device(device: &DeviceInfo, label: &str) -> Self {
        Self {
            name: device.name.clone(),
            did: device.did.clone(),
            model: device.model.clone(),
            key: label.to_lowercase(),
        }
    }

    /// Values in the order of [`SampleLabels::NAMES`].
    pub fn values(&self) -> [&str; 4] {
        [
            self.name.as_str(),
            self.did.as_str(),
            self.model.as_str(),
            self.key.as_str(),
        ]
    }

    pub const NAMES: [&'static str; 4] = ["name", "did", "model", "key"];
}

/// One reading of one device property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub labels: SampleLabels,
    /// NaN when the device returned nothing usable
    pub value: f64,
}

impl Sample {
    pub fn new(device: &DeviceInfo, label: &str, raw: &serde_json::Value) -> Self {
        Self {
            labels: SampleLabels::for_device(device, label),
            value: coerce_value(raw),
        }
    }
}

/// Coerce a raw property value to a float.
///
/// Falsy values (`null`, `false`, `0`, `""`) and non-numeric values become NaN.
/// `true` maps to 1 and numeric strings are parsed, so `"0"` is still 0.
pub fn coerce_value(raw: &serde_json::Value) -> f64 {
    use serde_json::Value;

    match raw {
        Value::Number(number) => match number.as_f64() {
            Some(value) if value != 0.0 => value,
            _ => f64::NAN,
        },
        Value::Bool(true) => 1.0,
        Value::Bool(false) => f64::NAN,
        Value::String(text) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Null | Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Outcome of collecting one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectReport {
    pub model: String,
    /// Devices of the model known to the registry
    pub devices: usize,
    /// Labels resolved against the model's spec
    pub resolved: usize,
    /// Samples written to the sink
    pub samples: usize,
    /// Devices whose batched read failed
    pub failed_devices: Vec<String>,
}

/// Outcome of one full polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub models: Vec<CollectReport>,
    /// Models whose collection aborted, with the reason
    pub failed_models: Vec<(String, String)>,
}

impl CycleReport {
    pub fn samples(&self) -> usize {
        self.models.iter().map(|report| report.samples).sum()
    }
}
