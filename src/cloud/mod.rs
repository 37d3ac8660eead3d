//! Xiaomi cloud implementations of the collector traits.
//!
//! [`CloudConnector`] opens one [`MiioService`] per polling cycle. Every session reloads
//! the token file, so a login performed by one cycle is picked up by the next.

pub mod account;
pub mod catalog;
pub mod service;
pub mod sign;

pub use account::{MiAccount, MiToken, TokenStore};
pub use catalog::SpecCatalog;
pub use service::MiioService;

use crate::error::Result;
use crate::metrics::traits::SessionFactory;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout applied to every remote request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Account and transport settings.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token_path: PathBuf,
    pub timeout: Duration,
}

impl CloudConfig {
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            username: None,
            password: None,
            token_path: token_path.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build the HTTP client shared by all sessions.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Opens cloud sessions sharing one HTTP client and one descriptor catalog.
pub struct CloudConnector {
    config: CloudConfig,
    http: Client,
    catalog: Arc<SpecCatalog>,
}

impl CloudConnector {
    pub fn new(config: CloudConfig) -> Result<Self> {
        let http = http_client(config.timeout)?;
        let catalog = Arc::new(SpecCatalog::new(http.clone()));
        Ok(Self {
            config,
            http,
            catalog,
        })
    }

    pub fn catalog(&self) -> &Arc<SpecCatalog> {
        &self.catalog
    }

    /// A new session with its own account state.
    pub fn session(&self) -> MiioService {
        let account = MiAccount::new(
            self.http.clone(),
            self.config.username.clone(),
            self.config.password.clone(),
            TokenStore::new(&self.config.token_path),
        );
        MiioService::new(self.http.clone(), Arc::new(account), Arc::clone(&self.catalog))
    }
}

#[async_trait]
impl SessionFactory for CloudConnector {
    type Service = MiioService;

    async fn open(&self) -> Result<MiioService> {
        Ok(self.session())
    }
}
