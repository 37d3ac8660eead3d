//! Error handling for the Mi exporter crate.

/// A specialized `Result` type for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// The main error type for exporter operations.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    /// The device list could not be fetched from the account
    #[error("Device list unavailable: {0}")]
    RegistryFetch(String),

    /// A device record is missing required fields
    #[error("Malformed device record: {0}")]
    MalformedDevice(String),

    /// The descriptor for a model could not be fetched
    #[error("Spec for model `{model}` unavailable: {reason}")]
    SpecFetch { model: String, reason: String },

    /// The descriptor for a model is missing required fields
    #[error("Malformed spec for model `{model}`: {reason}")]
    MalformedSpec { model: String, reason: String },

    /// A batched property read failed for one device
    #[error("Property read failed for device {did}: {reason}")]
    DeviceRead { did: String, reason: String },

    /// Remote service transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Account login or token failure
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metric registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ExporterError {
    /// Create a new registry fetch error
    pub fn registry_fetch(msg: impl Into<String>) -> Self {
        Self::RegistryFetch(msg.into())
    }

    /// Create a new malformed device error
    pub fn malformed_device(msg: impl Into<String>) -> Self {
        Self::MalformedDevice(msg.into())
    }

    /// Create a new spec fetch error
    pub fn spec_fetch(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpecFetch {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a new malformed spec error
    pub fn malformed_spec(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSpec {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Create a new device read error
    pub fn device_read(did: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceRead {
            did: did.into(),
            reason: reason.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether the error comes from data the remote side sent in an unexpected shape,
    /// as opposed to a transient failure that the next cycle may not hit.
    pub fn is_malformed_data(&self) -> bool {
        matches!(
            self,
            Self::MalformedDevice(_) | Self::MalformedSpec { .. } | Self::Json(_)
        )
    }
}

impl From<reqwest::Error> for ExporterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExporterError::spec_fetch("zhimi.airpurifier.ma4", "timeout");
        assert_eq!(
            err.to_string(),
            "Spec for model `zhimi.airpurifier.ma4` unavailable: timeout"
        );

        let err = ExporterError::device_read("123", "code -704042011");
        assert!(err.to_string().contains("123"));
    }

    #[test]
    fn test_malformed_classification() {
        assert!(ExporterError::malformed_device("missing token").is_malformed_data());
        assert!(ExporterError::malformed_spec("m", "missing services").is_malformed_data());
        assert!(!ExporterError::registry_fetch("connection reset").is_malformed_data());
        assert!(!ExporterError::transport("timeout").is_malformed_data());
    }
}
