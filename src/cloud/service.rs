//! Signed requests against the home API.

use crate::cloud::account::{cookie_header, MiAccount};
use crate::cloud::catalog::SpecCatalog;
use crate::cloud::sign::sign_data;
use crate::error::{ExporterError, Result};
use crate::metrics::traits::{DeviceDirectory, PropertyReader, SpecSource};
use crate::miot::resolver::PropertyPath;
use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Base URL of the home API.
pub const API_SERVER: &str = "https://api.io.mi.com/app";

const API_USER_AGENT: &str = "iOS-14.4-6.0.103-iPhone12,3--D7744744F7AF32F0544445285880DD63E47D9BE9-8816080-84A3F44E137B71AE-iPhone";

/// Build the `prop/get` parameters for one device.
pub fn prop_get_params(did: &str, properties: &[PropertyPath]) -> Value {
    let params: Vec<Value> = properties
        .iter()
        .map(|path| json!({"did": did, "siid": path.siid(), "piid": path.piid()}))
        .collect();
    json!({ "params": params })
}

/// Values of a `prop/get` result, `null` wherever the entry carries a non-zero code.
pub fn prop_get_values(result: Value) -> Result<Vec<Value>> {
    let entries = match result {
        Value::Array(entries) => entries,
        other => {
            return Err(ExporterError::transport(format!(
                "prop/get returned {} instead of a list",
                other
            )))
        }
    };

    Ok(entries
        .into_iter()
        .map(|mut entry| {
            if entry.get("code").and_then(Value::as_i64) == Some(0) {
                entry.get_mut("value").map(Value::take).unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        })
        .collect())
}

/// One session against the home API plus the shared descriptor catalog.
pub struct MiioService {
    http: Client,
    account: Arc<MiAccount>,
    catalog: Arc<SpecCatalog>,
    server: String,
}

impl MiioService {
    pub fn new(http: Client, account: Arc<MiAccount>, catalog: Arc<SpecCatalog>) -> Self {
        Self {
            http,
            account,
            catalog,
            server: API_SERVER.to_string(),
        }
    }

    /// POST a signed request and return its `result`.
    ///
    /// A request rejected for authentication is retried once after a fresh login.
    pub async fn miio_request(&self, uri: &str, data: &Value) -> Result<Value> {
        let data = serde_json::to_string(data)?;
        let mut relogin = true;

        loop {
            let credentials = self.account.credentials().await?;
            let form = sign_data(uri, &data, &credentials.ssecurity)?;
            let cookies = cookie_header(&[
                ("userId", credentials.user_id.as_str()),
                ("serviceToken", credentials.service_token.as_str()),
                ("PassportDeviceId", credentials.device_id.as_str()),
            ]);

            let response = self
                .http
                .post(format!("{}{}", self.server, uri))
                .header(USER_AGENT, API_USER_AGENT)
                .header("x-xiaomi-protocal-flag-cli", "PROTOCAL-HTTP2")
                .header(COOKIE, cookies)
                .form(&form)
                .send()
                .await?;

            let status = response.status();
            let (unauthorized, failure) = if status.is_success() {
                let body: Value = response.json().await?;
                if body.get("code").and_then(Value::as_i64) == Some(0) {
                    return body
                        .get("result")
                        .cloned()
                        .ok_or_else(|| ExporterError::transport(format!("{}: no result in {}", uri, body)));
                }
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase();
                (message.contains("auth"), body.to_string())
            } else {
                (
                    status == StatusCode::UNAUTHORIZED,
                    response.text().await.unwrap_or_default(),
                )
            };

            if unauthorized && relogin {
                warn!(uri = %uri, "Session rejected, logging in again");
                self.account.invalidate().await;
                relogin = false;
                continue;
            }

            return Err(if unauthorized {
                ExporterError::auth(format!("{}: {}", uri, failure))
            } else {
                ExporterError::transport(format!("{} ({}): {}", uri, status, failure))
            });
        }
    }
}

#[async_trait]
impl DeviceDirectory for MiioService {
    async fn list_devices(&self) -> Result<Vec<Value>> {
        let result = self
            .miio_request(
                "/home/device_list",
                &json!({"getVirtualModel": false, "getHuamiDevices": 0}),
            )
            .await
            .map_err(|err| ExporterError::registry_fetch(err.to_string()))?;

        match result.get("list") {
            Some(Value::Array(list)) => {
                debug!(devices = list.len(), "Listed devices");
                Ok(list.clone())
            }
            _ => Err(ExporterError::malformed_device(
                "device list response without `list`",
            )),
        }
    }
}

#[async_trait]
impl SpecSource for MiioService {
    async fn fetch_spec(&self, model: &str) -> Result<Value> {
        self.catalog.fetch_spec(model).await
    }
}

#[async_trait]
impl PropertyReader for MiioService {
    async fn read_properties(&self, did: &str, properties: &[PropertyPath]) -> Result<Vec<Value>> {
        let result = self
            .miio_request("/miotspec/prop/get", &prop_get_params(did, properties))
            .await
            .map_err(|err| ExporterError::device_read(did, err.to_string()))?;

        prop_get_values(result).map_err(|err| ExporterError::device_read(did, err.to_string()))
    }
}
