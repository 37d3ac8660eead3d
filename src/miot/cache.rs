//! Per-model descriptor cache.

use crate::error::{ExporterError, Result};
use crate::metrics::traits::SpecSource;
use crate::miot::spec::SpecTree;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Caches one parsed descriptor per model for the lifetime of the cache.
///
/// Only fully parsed trees are stored. Two tasks missing the same model at once may
/// both fetch it; the second insert replaces an equivalent tree.
#[derive(Debug, Default)]
pub struct SpecCache {
    specs: RwLock<HashMap<String, Arc<SpecTree>>>,
}

impl SpecCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the descriptor of `model`, fetching it on first use.
    pub async fn get_spec<S>(&self, source: &S, model: &str) -> Result<Arc<SpecTree>>
    where
        S: SpecSource + ?Sized,
    {
        if let Some(spec) = self.specs.read().await.get(model) {
            return Ok(Arc::clone(spec));
        }

        debug!(model = %model, "Fetching spec");
        let raw = source.fetch_spec(model).await.map_err(|err| match err {
            ExporterError::SpecFetch { .. } | ExporterError::MalformedSpec { .. } => err,
            other => ExporterError::spec_fetch(model, other.to_string()),
        })?;
        let spec = Arc::new(SpecTree::from_value(model, raw)?);
        info!(
            model = %model,
            services = spec.services.len(),
            "Cached spec"
        );

        self.specs
            .write()
            .await
            .insert(model.to_string(), Arc::clone(&spec));

        Ok(spec)
    }

    /// Drop the cached descriptor of `model` so the next lookup fetches it again.
    pub async fn invalidate(&self, model: &str) -> bool {
        self.specs.write().await.remove(model).is_some()
    }

    pub async fn clear(&self) {
        self.specs.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.specs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.specs.read().await.is_empty()
    }
}
