//! Request signing for the home API.

use crate::error::{ExporterError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Form body of a signed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedForm {
    #[serde(rename = "_nonce")]
    pub nonce: String,
    pub data: String,
    pub signature: String,
}

/// Nonce made of 8 random bytes followed by the big-endian minute count since the epoch.
pub fn nonce_from(random: [u8; 8], minutes: u32) -> String {
    let mut raw = [0u8; 12];
    raw[..8].copy_from_slice(&random);
    raw[8..].copy_from_slice(&minutes.to_be_bytes());
    STANDARD.encode(raw)
}

/// A fresh nonce for the current minute.
pub fn generate_nonce() -> String {
    let minutes = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 60;
    nonce_from(rand::random(), minutes as u32)
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|err| ExporterError::auth(format!("Invalid base64 in {}: {}", field, err)))
}

/// `base64(sha256(ssecurity ++ nonce))`, both inputs base64-decoded first.
pub fn sign_nonce(ssecurity: &str, nonce: &str) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(decode("ssecurity", ssecurity)?);
    hasher.update(decode("nonce", nonce)?);
    Ok(STANDARD.encode(hasher.finalize()))
}

/// Sign `data` for `uri` with an explicit nonce.
pub fn sign_data_with_nonce(uri: &str, data: &str, ssecurity: &str, nonce: String) -> Result<SignedForm> {
    let signed_nonce = sign_nonce(ssecurity, &nonce)?;
    let data_field = format!("data={}", data);
    let message = [uri, signed_nonce.as_str(), nonce.as_str(), data_field.as_str()].join("&");

    let mut mac = Hmac::<Sha256>::new_from_slice(&decode("signed nonce", &signed_nonce)?)
        .map_err(|err| ExporterError::auth(err.to_string()))?;
    mac.update(message.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(SignedForm {
        nonce,
        data: data.to_string(),
        signature,
    })
}

/// Sign `data` for `uri` with a fresh nonce.
pub fn sign_data(uri: &str, data: &str, ssecurity: &str) -> Result<SignedForm> {
    sign_data_with_nonce(uri, data, ssecurity, generate_nonce())
}

/// Client signature sent when exchanging a login nonce for a service token.
pub fn client_sign(nonce: &str, ssecurity: &str) -> String {
    let digest = Sha1::digest(format!("nonce={}&{}", nonce, ssecurity).as_bytes());
    STANDARD.encode(digest)
}

/// Upper-case hex MD5 of the account password.
pub fn password_hash(password: &str) -> String {
    format!("{:X}", md5::compute(password.as_bytes()))
}
