//! Traits for the remote services the collectors depend on.
//!
//! Raw payloads cross these seams as `serde_json::Value`; decoding into typed records
//! happens on the registry side so malformed data is reported uniformly whatever the
//! transport.

use crate::error::Result;
use crate::miot::resolver::PropertyPath;
use async_trait::async_trait;

/// Lists the devices bound to the account.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Raw device records, each expected to carry `name`, `model`, `did` and `token`.
    async fn list_devices(&self) -> Result<Vec<serde_json::Value>>;
}

/// Fetches capability descriptors.
#[async_trait]
pub trait SpecSource: Send + Sync {
    /// The raw JSON descriptor of a model: `{type, description, services: [...]}`.
    async fn fetch_spec(&self, model: &str) -> Result<serde_json::Value>;
}

/// Reads current property values from devices.
#[async_trait]
pub trait PropertyReader: Send + Sync {
    /// Read several properties of one device in a single request.
    ///
    /// The returned values correspond positionally to `properties`; a value the device
    /// could not provide is `Value::Null`.
    async fn read_properties(
        &self,
        did: &str,
        properties: &[PropertyPath],
    ) -> Result<Vec<serde_json::Value>>;
}

/// Everything one polling cycle needs from the remote side.
pub trait MiotService: DeviceDirectory + SpecSource + PropertyReader {}

impl<T> MiotService for T where T: DeviceDirectory + SpecSource + PropertyReader {}

/// Opens an authenticated service context, once per polling cycle.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Service: MiotService;

    async fn open(&self) -> Result<Self::Service>;
}
