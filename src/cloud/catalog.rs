//! Public descriptor catalog.

use crate::error::{ExporterError, Result};
use crate::metrics::traits::SpecSource;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::debug;

/// Base URL of the public descriptor catalog.
pub const SPEC_BASE_URL: &str = "http://miot-spec.org/miot-spec-v2";

/// One entry of the catalog's instance list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Instance {
    pub model: String,
    #[serde(rename = "type")]
    pub urn: String,
    #[serde(default)]
    pub version: u32,
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    instances: Vec<Instance>,
}

/// Keep the highest version of every model. Ties go to the later entry.
pub fn latest_by_model(instances: Vec<Instance>) -> HashMap<String, Instance> {
    let mut latest: HashMap<String, Instance> = HashMap::new();
    for instance in instances {
        match latest.get(&instance.model) {
            Some(known) if known.version > instance.version => {}
            _ => {
                latest.insert(instance.model.clone(), instance);
            }
        }
    }
    latest
}

/// Resolves models to descriptor URNs and downloads descriptors.
///
/// The instance list is downloaded once per catalog.
pub struct SpecCatalog {
    http: Client,
    base_url: String,
    instances: OnceCell<HashMap<String, Instance>>,
}

impl SpecCatalog {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, SPEC_BASE_URL)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            instances: OnceCell::new(),
        }
    }

    async fn instances(&self) -> Result<&HashMap<String, Instance>> {
        self.instances
            .get_or_try_init(|| async {
                let url = format!("{}/instances?status=all", self.base_url);
                debug!(url = %url, "Downloading instance list");
                let list: InstanceList = self
                    .http
                    .get(&url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok::<_, ExporterError>(latest_by_model(list.instances))
            })
            .await
    }

    /// The descriptor URN of `model`. URNs are passed through.
    pub async fn urn_for(&self, model: &str) -> Result<String> {
        if model.starts_with("urn:") {
            return Ok(model.to_string());
        }

        self.instances()
            .await
            .map_err(|err| ExporterError::spec_fetch(model, err.to_string()))?
            .get(model)
            .map(|instance| instance.urn.clone())
            .ok_or_else(|| ExporterError::spec_fetch(model, "model not in catalog"))
    }
}

#[async_trait]
impl SpecSource for SpecCatalog {
    async fn fetch_spec(&self, model: &str) -> Result<serde_json::Value> {
        let urn = self.urn_for(model).await?;
        let url = format!("{}/instance", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("type", urn.as_str())])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ExporterError::spec_fetch(model, err.to_string()))?;

        response
            .json()
            .await
            .map_err(|err| ExporterError::malformed_spec(model, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(model: &str, version: u32) -> Instance {
        Instance {
            model: model.to_string(),
            urn: format!("urn:miot-spec-v2:device:test:0000A000:{}:{}", model, version),
            version,
        }
    }

    #[test]
    fn test_latest_version_wins() {
        let latest = latest_by_model(vec![
            instance("zhimi.airpurifier.ma4", 2),
            instance("zhimi.airpurifier.ma4", 1),
            instance("chuangmi.plug.m1", 1),
            instance("chuangmi.plug.m1", 3),
        ]);

        assert_eq!(latest.len(), 2);
        assert_eq!(latest["zhimi.airpurifier.ma4"].version, 2);
        assert_eq!(latest["chuangmi.plug.m1"].version, 3);
    }

    #[test]
    fn test_instance_list_decoding() {
        let list: InstanceList = serde_json::from_str(
            r#"{"instances": [
                {"status": "released", "model": "lumi.sensor_ht.v1", "version": 1,
                 "type": "urn:miot-spec-v2:device:temperature-humidity-sensor:0000A00A:lumi-v1:1", "ts": 1}
            ]}"#,
        )
        .unwrap();
        assert_eq!(list.instances[0].model, "lumi.sensor_ht.v1");
        assert!(list.instances[0].urn.starts_with("urn:miot-spec-v2:device"));
    }

    #[tokio::test]
    async fn test_urn_passthrough() {
        let catalog = SpecCatalog::new(Client::new());
        let urn = "urn:miot-spec-v2:device:outlet:0000A002:chuangmi-m1:1";
        assert_eq!(catalog.urn_for(urn).await.unwrap(), urn);
    }
}
