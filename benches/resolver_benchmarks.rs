use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mi_exporter::{
    error::Result,
    metrics::{
        traits::{DeviceDirectory, PropertyReader, SpecSource},
        Collector, MemorySink, ProfileSet,
    },
    miot::{resolve, resolve_all, DeviceRegistry, PropertyPath, SpecCache, SpecTree},
};
use serde_json::{json, Value};

const MODEL: &str = "zhimi.airpurifier.ma4";

/// A descriptor with `services` services of `properties` properties each, plus the
/// services the built-in air purifier profile asks for.
fn descriptor(services: u32, properties: u32) -> Value {
    let mut nodes: Vec<Value> = (0..services)
        .map(|s| {
            let props: Vec<Value> = (0..properties)
                .map(|p| json!({"iid": p + 1, "type": "p", "description": format!("Property {}", p), "access": ["read"]}))
                .collect();
            json!({"iid": s + 10, "type": "s", "description": format!("Service {}", s), "properties": props})
        })
        .collect();

    nodes.push(json!({"iid": 2, "type": "s", "description": "Air Purifier", "properties": [
        {"iid": 1, "type": "p", "description": "Switch Status"},
        {"iid": 4, "type": "p", "description": "Mode"}
    ]}));
    nodes.push(json!({"iid": 3, "type": "s", "description": "Environment", "properties": [
        {"iid": 6, "type": "p", "description": "PM2.5 Density"},
        {"iid": 7, "type": "p", "description": "Relative Humidity"},
        {"iid": 8, "type": "p", "description": "Temperature"}
    ]}));

    json!({"type": "urn:bench", "description": "Bench", "services": nodes})
}

/// Benchmark descriptor parsing
fn bench_descriptor_parsing(c: &mut Criterion) {
    for size in [4u32, 16, 64].iter() {
        let raw = descriptor(*size, *size);
        c.bench_with_input(BenchmarkId::new("descriptor_parsing", size), &raw, |b, raw| {
            b.iter(|| SpecTree::from_value(MODEL, raw.clone()).expect("Should parse"))
        });
    }
}

/// Benchmark path resolution against a wide tree
fn bench_path_resolution(c: &mut Criterion) {
    let tree = SpecTree::from_value(MODEL, descriptor(64, 32)).expect("Should parse");

    c.bench_function("resolve_last_service", |b| {
        b.iter(|| resolve(&tree, &["Environment", "Temperature"]).expect("Should resolve"))
    });

    c.bench_function("resolve_missing_path", |b| {
        b.iter(|| resolve(&tree, &["Filter", "Filter Life Level"]).is_err())
    });

    let profiles = ProfileSet::builtin();
    let paths = profiles.get(MODEL).expect("Should have profile").named_paths();
    c.bench_function("resolve_builtin_profile", |b| {
        b.iter(|| resolve_all(&tree, &paths))
    });
}

struct StaticCloud {
    devices: usize,
}

#[async_trait]
impl DeviceDirectory for StaticCloud {
    async fn list_devices(&self) -> Result<Vec<Value>> {
        Ok((0..self.devices)
            .map(|n| json!({"name": format!("Purifier {}", n), "model": MODEL, "did": n.to_string(), "token": "t"}))
            .collect())
    }
}

#[async_trait]
impl SpecSource for StaticCloud {
    async fn fetch_spec(&self, _model: &str) -> Result<Value> {
        Ok(descriptor(8, 8))
    }
}

#[async_trait]
impl PropertyReader for StaticCloud {
    async fn read_properties(&self, _did: &str, properties: &[PropertyPath]) -> Result<Vec<Value>> {
        tokio::task::yield_now().await;
        Ok(properties.iter().map(|p| json!(p.piid())).collect())
    }
}

/// Benchmark one collection pass over a fleet of devices
fn bench_collection_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let cloud = StaticCloud { devices: 50 };
    let registry = DeviceRegistry::new();
    let specs = SpecCache::new();
    rt.block_on(registry.refresh(&cloud)).expect("Should list devices");

    let profiles = ProfileSet::builtin();
    let profile = profiles.get(MODEL).expect("Should have profile");

    for concurrency in [1usize, 4, 16].iter() {
        let collector = Collector::from_profile(profile).with_concurrency(*concurrency);
        c.bench_with_input(
            BenchmarkId::new("collection_pass", concurrency),
            &collector,
            |b, collector| {
                b.to_async(&rt).iter(|| async {
                    let sink = MemorySink::new();
                    collector
                        .collect(&registry, &specs, &cloud, &sink)
                        .await
                        .expect("Should collect")
                })
            },
        );
    }
}

criterion_group!(
    benches,
    bench_descriptor_parsing,
    bench_path_resolution,
    bench_collection_pass
);
criterion_main!(benches);
