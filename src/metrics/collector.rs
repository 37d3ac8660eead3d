//! Per-model property collection.

use crate::error::Result;
use crate::metrics::data::{CollectReport, Sample};
use crate::metrics::profile::ModelProfile;
use crate::metrics::sink::MetricsSink;
use crate::metrics::traits::MiotService;
use crate::miot::device::DeviceInfo;
use crate::miot::resolver::{resolve_all, NamedPath, PropertyPath, ResolvedProperty};
use crate::miot::{DeviceRegistry, SpecCache};
use futures_util::stream::{self, StreamExt};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Collects the configured properties of every device of one model.
///
/// Paths are resolved against the model descriptor on the first successful pass and
/// reused for the rest of the process.
#[derive(Debug)]
pub struct Collector {
    model: String,
    paths: Vec<NamedPath>,
    resolved: OnceCell<Vec<ResolvedProperty>>,
    concurrency: usize,
}

impl Collector {
    pub fn new(model: impl Into<String>, paths: Vec<NamedPath>) -> Self {
        Self {
            model: model.into(),
            paths,
            resolved: OnceCell::new(),
            concurrency: 1,
        }
    }

    pub fn from_profile(profile: &ModelProfile) -> Self {
        Self::new(profile.model.clone(), profile.named_paths())
    }

    /// Read up to `concurrency` devices at once. Defaults to one at a time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolved properties, if the descriptor has been fetched already.
    pub fn resolved(&self) -> Option<&[ResolvedProperty]> {
        self.resolved.get().map(Vec::as_slice)
    }

    async fn resolve<S>(&self, specs: &SpecCache, service: &S) -> Result<&[ResolvedProperty]>
    where
        S: MiotService + ?Sized,
    {
        let resolved = self
            .resolved
            .get_or_try_init(|| async {
                let spec = specs.get_spec(service, &self.model).await?;
                let (resolved, unresolved) = resolve_all(&spec, &self.paths);
                for (path, failure) in &unresolved {
                    debug!(
                        model = %self.model,
                        path = %path.label,
                        reason = %failure,
                        "Skipping unresolved path"
                    );
                }
                Ok::<_, crate::error::ExporterError>(resolved)
            })
            .await?;

        Ok(resolved.as_slice())
    }

    /// Run one collection pass for this model.
    ///
    /// A descriptor failure aborts the pass. A failed read only skips the affected device.
    pub async fn collect<S>(
        &self,
        registry: &DeviceRegistry,
        specs: &SpecCache,
        service: &S,
        sink: &dyn MetricsSink,
    ) -> Result<CollectReport>
    where
        S: MiotService + ?Sized,
    {
        let resolved = self.resolve(specs, service).await?;
        let devices = registry.devices_by_model(&self.model);

        let mut report = CollectReport {
            model: self.model.clone(),
            devices: devices.len(),
            resolved: resolved.len(),
            ..Default::default()
        };

        if resolved.is_empty() || devices.is_empty() {
            debug!(
                model = %self.model,
                devices = devices.len(),
                resolved = resolved.len(),
                "Nothing to collect"
            );
            return Ok(report);
        }

        let properties: Vec<PropertyPath> =
            resolved.iter().map(|prop| prop.path.clone()).collect();

        let mut reads = stream::iter(devices.iter())
            .map(|device| {
                let properties = &properties;
                async move {
                    let values = service.read_properties(&device.did, properties).await;
                    (device, values)
                }
            })
            .buffered(self.concurrency);

        while let Some((device, values)) = reads.next().await {
            match values {
                Ok(values) => {
                    report.samples += emit_samples(device, resolved, &values, sink);
                }
                Err(err) => {
                    warn!(
                        model = %self.model,
                        did = %device.did,
                        name = %device.name,
                        "Property read failed: {}",
                        err
                    );
                    sink.record_device_error(&self.model);
                    report.failed_devices.push(device.did.clone());
                }
            }
        }

        Ok(report)
    }
}

fn emit_samples(
    device: &DeviceInfo,
    resolved: &[ResolvedProperty],
    values: &[serde_json::Value],
    sink: &dyn MetricsSink,
) -> usize {
    if values.len() != resolved.len() {
        debug!(
            did = %device.did,
            requested = resolved.len(),
            returned = values.len(),
            "Read returned a different number of values"
        );
    }

    let mut emitted = 0;
    for (prop, raw) in resolved.iter().zip(values) {
        let sample = Sample::new(device, &prop.label, raw);
        sink.set_gauge(&sample.labels, sample.value);
        emitted += 1;
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExporterError;
    use crate::metrics::sink::MemorySink;
    use crate::metrics::traits::{DeviceDirectory, PropertyReader, SpecSource};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeService {
        devices: Vec<Value>,
        spec: Option<Value>,
        values: HashMap<String, Vec<Value>>,
        requests: Mutex<Vec<(String, Vec<PropertyPath>)>>,
        spec_fetches: AtomicUsize,
    }

    #[async_trait]
    impl DeviceDirectory for FakeService {
        async fn list_devices(&self) -> Result<Vec<Value>> {
            Ok(self.devices.clone())
        }
    }

    #[async_trait]
    impl SpecSource for FakeService {
        async fn fetch_spec(&self, model: &str) -> Result<Value> {
            self.spec_fetches.fetch_add(1, Ordering::SeqCst);
            self.spec
                .clone()
                .ok_or_else(|| ExporterError::spec_fetch(model, "not found"))
        }
    }

    #[async_trait]
    impl PropertyReader for FakeService {
        async fn read_properties(&self, did: &str, properties: &[PropertyPath]) -> Result<Vec<Value>> {
            self.requests
                .lock()
                .unwrap()
                .push((did.to_string(), properties.to_vec()));
            self.values
                .get(did)
                .cloned()
                .ok_or_else(|| ExporterError::device_read(did, "offline"))
        }
    }

    fn plug_spec() -> Value {
        json!({
            "type": "urn:miot-spec-v2:device:outlet:0000A002:chuangmi-m1:1",
            "description": "Outlet",
            "services": [
                {"iid": 2, "type": "s", "description": "Switch", "properties": [
                    {"iid": 1, "type": "p", "description": "Switch Status", "access": ["read", "write", "notify"]},
                    {"iid": 2, "type": "p", "description": "Temperature", "access": ["read"]}
                ]}
            ]
        })
    }

    fn plug(did: &str) -> Value {
        json!({"name": format!("Plug {}", did), "model": "chuangmi.plug.m1", "did": did, "token": "t"})
    }

    fn collector() -> Collector {
        Collector::new(
            "chuangmi.plug.m1",
            vec![
                NamedPath::from_segments(["Switch", "Switch Status"]),
                NamedPath::from_segments(["Switch", "Missing"]),
                NamedPath::from_segments(["Switch", "Temperature"]),
            ],
        )
    }

    async fn setup(service: &FakeService) -> (DeviceRegistry, SpecCache) {
        let registry = DeviceRegistry::new();
        registry.refresh(service).await.unwrap();
        (registry, SpecCache::new())
    }

    #[tokio::test]
    async fn test_one_batched_read_per_device() {
        let service = FakeService {
            devices: vec![plug("1"), plug("2")],
            spec: Some(plug_spec()),
            values: HashMap::from([
                ("1".to_string(), vec![json!(true), json!(38)]),
                ("2".to_string(), vec![json!(false), json!("41.5")]),
            ]),
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();

        let report = collector()
            .collect(&registry, &specs, &service, &sink)
            .await
            .unwrap();

        assert_eq!(report.devices, 2);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.samples, 4);

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].1,
            vec![PropertyPath::new(vec![2, 1]), PropertyPath::new(vec![2, 2])]
        );

        assert_eq!(sink.value_of("1", "switch/switch status"), Some(1.0));
        assert_eq!(sink.value_of("2", "switch/temperature"), Some(41.5));
    }

    #[tokio::test]
    async fn test_failed_device_does_not_stop_others() {
        let service = FakeService {
            devices: vec![plug("1"), plug("2")],
            spec: Some(plug_spec()),
            values: HashMap::from([("2".to_string(), vec![json!(true), json!(30)])]),
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();

        let report = collector()
            .collect(&registry, &specs, &service, &sink)
            .await
            .unwrap();

        assert_eq!(report.failed_devices, ["1"]);
        assert_eq!(sink.value_of("2", "switch/temperature"), Some(30.0));
        assert_eq!(sink.value_of("1", "switch/temperature"), None);
        assert_eq!(sink.device_errors("chuangmi.plug.m1"), 1);
    }

    #[tokio::test]
    async fn test_spec_failure_aborts_model() {
        let service = FakeService {
            devices: vec![plug("1")],
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();

        let err = collector()
            .collect(&registry, &specs, &service, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ExporterError::SpecFetch { .. }));
        assert!(sink.is_empty());
        assert!(service.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolution_is_memoized() {
        let service = FakeService {
            devices: vec![plug("1")],
            spec: Some(plug_spec()),
            values: HashMap::from([("1".to_string(), vec![json!(1), json!(2)])]),
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();
        let collector = collector();
        assert!(collector.resolved().is_none());

        collector.collect(&registry, &specs, &service, &sink).await.unwrap();
        specs.clear().await;
        collector.collect(&registry, &specs, &service, &sink).await.unwrap();

        assert_eq!(service.spec_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(collector.resolved().map(|r| r.len()), Some(2));
    }

    #[tokio::test]
    async fn test_empty_path_sends_no_request() {
        let service = FakeService {
            devices: vec![plug("1")],
            spec: Some(plug_spec()),
            values: HashMap::from([("1".to_string(), vec![json!(1)])]),
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();

        let report = Collector::new("chuangmi.plug.m1", vec![NamedPath::from_segments(Vec::<String>::new())])
            .collect(&registry, &specs, &service, &sink)
            .await
            .unwrap();
        assert_eq!(report.resolved, 0);
        assert!(service.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_read_emits_present_pairs_only() {
        let service = FakeService {
            devices: vec![plug("1")],
            spec: Some(plug_spec()),
            values: HashMap::from([("1".to_string(), vec![json!(true)])]),
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();

        let report = collector()
            .collect(&registry, &specs, &service, &sink)
            .await
            .unwrap();
        assert_eq!(report.samples, 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reads_keep_all_devices() {
        let service = FakeService {
            devices: (1..=5).map(|i| plug(&i.to_string())).collect(),
            spec: Some(plug_spec()),
            values: (1..=5)
                .map(|i| (i.to_string(), vec![json!(1), json!(i)]))
                .collect(),
            ..Default::default()
        };
        let (registry, specs) = setup(&service).await;
        let sink = MemorySink::new();

        let report = collector()
            .with_concurrency(3)
            .collect(&registry, &specs, &service, &sink)
            .await
            .unwrap();
        assert_eq!(report.samples, 10);
        assert_eq!(sink.value_of("4", "switch/temperature"), Some(4.0));
    }
}
