//! Account login and token persistence.

use crate::cloud::sign::{client_sign, password_hash};
use crate::error::{ExporterError, Result};
use rand::distributions::{Alphanumeric, DistString};
use reqwest::header::{COOKIE, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Service id of the home API.
pub const SID: &str = "xiaomiio";

const ACCOUNT_URL: &str = "https://account.xiaomi.com/pass/";
const LOGIN_USER_AGENT: &str =
    "APP/com.xiaomi.mihome APPV/6.0.103 iosPassportSDK/3.9.0 iOS/14.4 miHSTS";
const LOGIN_PREFIX: &str = "&&&START&&&";

/// Account user id, numeric in fresh logins but kept verbatim from token files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(u64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

/// Persisted login state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiToken {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(rename = "passToken", default, skip_serializing_if = "Option::is_none")]
    pub pass_token: Option<String>,
    /// `(ssecurity, serviceToken)` for the home API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xiaomiio: Option<(String, String)>,
    /// Tokens of other services, kept as found
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl MiToken {
    /// A blank token with a random device id.
    pub fn fresh() -> Self {
        Self {
            device_id: Alphanumeric
                .sample_string(&mut rand::thread_rng(), 16)
                .to_uppercase(),
            ..Default::default()
        }
    }
}

/// JSON token file on disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the token, `None` if the file does not exist or cannot be parsed.
    pub fn load(&self) -> Option<MiToken> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&text) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!(path = %self.path.display(), "Ignoring unreadable token file: {}", err);
                None
            }
        }
    }

    pub fn save(&self, token: &MiToken) -> Result<()> {
        let text = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// What a signed home API request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredentials {
    pub user_id: String,
    pub device_id: String,
    pub ssecurity: String,
    pub service_token: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    code: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    qs: Option<String>,
    #[serde(default)]
    sid: Option<String>,
    #[serde(rename = "_sign", default)]
    sign: Option<String>,
    #[serde(default)]
    callback: Option<String>,
    #[serde(rename = "userId", default)]
    user_id: Option<UserId>,
    #[serde(rename = "passToken", default)]
    pass_token: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    nonce: Option<serde_json::Value>,
    #[serde(default)]
    ssecurity: Option<String>,
}

fn parse_login_response(body: &str) -> Result<LoginResponse> {
    let json = body.strip_prefix(LOGIN_PREFIX).unwrap_or(body);
    serde_json::from_str(json)
        .map_err(|err| ExporterError::auth(format!("Unexpected login response: {}", err)))
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field.ok_or_else(|| ExporterError::auth(format!("Login response without `{}`", name)))
}

fn nonce_text(nonce: serde_json::Value) -> String {
    match nonce {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

/// `k1=v1; k2=v2` cookie header value.
pub(crate) fn cookie_header(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn find_cookie(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// A logged-in account, backed by a token file.
///
/// The token is loaded from disk on first use and written back after every login.
pub struct MiAccount {
    http: Client,
    username: Option<String>,
    password: Option<String>,
    store: TokenStore,
    token: Mutex<Option<MiToken>>,
}

impl MiAccount {
    pub fn new(
        http: Client,
        username: Option<String>,
        password: Option<String>,
        store: TokenStore,
    ) -> Self {
        Self {
            http,
            username,
            password,
            store,
            token: Mutex::new(None),
        }
    }

    /// Credentials for the home API, logging in if no service token is at hand.
    pub async fn credentials(&self) -> Result<ServiceCredentials> {
        let mut guard = self.token.lock().await;
        let token = guard.get_or_insert_with(|| self.store.load().unwrap_or_else(MiToken::fresh));

        if token.xiaomiio.is_none() || token.user_id.is_none() {
            if let Err(err) = self.login(token).await {
                *guard = None;
                self.discard_stored_token();
                return Err(err);
            }
        }

        let token = guard
            .as_ref()
            .ok_or_else(|| ExporterError::auth("Login produced no token"))?;
        match (&token.user_id, &token.xiaomiio) {
            (Some(user_id), Some((ssecurity, service_token))) => Ok(ServiceCredentials {
                user_id: user_id.to_string(),
                device_id: token.device_id.clone(),
                ssecurity: ssecurity.clone(),
                service_token: service_token.clone(),
            }),
            _ => Err(ExporterError::auth("Login produced an incomplete token")),
        }
    }

    /// Remove the token file after a failed login. Errors are only logged.
    fn discard_stored_token(&self) {
        if let Err(err) = self.store.delete() {
            warn!(path = %self.store.path().display(), "Failed to delete token file: {}", err);
        }
    }

    /// Forget the service token so the next request logs in again.
    ///
    /// The pass token is kept, so the next login can skip the password when the
    /// account server still honours it.
    pub async fn invalidate(&self) {
        if let Some(token) = self.token.lock().await.as_mut() {
            token.xiaomiio = None;
        }
    }

    async fn login(&self, token: &mut MiToken) -> Result<()> {
        debug!("Logging in to account");
        let mut response = self
            .service_login(&format!("serviceLogin?sid={}&_json=true", SID), None, token)
            .await?;

        if response.code != 0 {
            let (username, password) = match (&self.username, &self.password) {
                (Some(username), Some(password)) => (username, password),
                _ => {
                    return Err(ExporterError::auth(
                        "Stored session expired and no account credentials were given",
                    ))
                }
            };

            let form = [
                ("_json", "true".to_string()),
                ("qs", required(response.qs.take(), "qs")?),
                ("sid", required(response.sid.take(), "sid")?),
                ("_sign", required(response.sign.take(), "_sign")?),
                ("callback", required(response.callback.take(), "callback")?),
                ("user", username.clone()),
                ("hash", password_hash(password)),
            ];
            response = self
                .service_login("serviceLoginAuth2", Some(&form), token)
                .await?;
            if response.code != 0 {
                return Err(ExporterError::auth(format!(
                    "Login rejected (code {}): {}",
                    response.code,
                    response.description.unwrap_or_default()
                )));
            }
        }

        let ssecurity = required(response.ssecurity, "ssecurity")?;
        let location = required(response.location, "location")?;
        let nonce = response
            .nonce
            .map(nonce_text)
            .ok_or_else(|| ExporterError::auth("Login response without `nonce`"))?;
        let service_token = self.security_token(&location, &nonce, &ssecurity).await?;

        token.user_id = response.user_id;
        token.pass_token = response.pass_token;
        token.xiaomiio = Some((ssecurity, service_token));
        self.store.save(token)?;
        info!(path = %self.store.path().display(), "Logged in, token saved");

        Ok(())
    }

    async fn service_login(
        &self,
        uri: &str,
        form: Option<&[(&str, String)]>,
        token: &MiToken,
    ) -> Result<LoginResponse> {
        let mut cookies = vec![("sdkVersion", "3.9".to_string()), ("deviceId", token.device_id.clone())];
        if let (Some(user_id), Some(pass_token)) = (&token.user_id, &token.pass_token) {
            cookies.push(("userId", user_id.to_string()));
            cookies.push(("passToken", pass_token.clone()));
        }
        let cookies: Vec<(&str, &str)> = cookies
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();

        let url = format!("{}{}", ACCOUNT_URL, uri);
        let request = match form {
            Some(form) => self.http.post(&url).form(form),
            None => self.http.get(&url),
        };
        let body = request
            .header(USER_AGENT, LOGIN_USER_AGENT)
            .header(COOKIE, cookie_header(&cookies))
            .send()
            .await?
            .text()
            .await?;

        parse_login_response(&body)
    }

    async fn security_token(&self, location: &str, nonce: &str, ssecurity: &str) -> Result<String> {
        let mut url = Url::parse(location)
            .map_err(|err| ExporterError::auth(format!("Invalid login location: {}", err)))?;
        url.query_pairs_mut()
            .append_pair("clientSign", &client_sign(nonce, ssecurity));

        let response = self.http.get(url).send().await?;
        match find_cookie(response.headers(), "serviceToken") {
            Some(token) => Ok(token),
            None => Err(ExporterError::auth(format!(
                "No service token in response: {}",
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}
