//! ClearKey DRM configuration
//!
//! Key material arrives from the catalog as a `key id -> key` map of hex
//! strings. It is validated once, when the source is built, and then handed
//! to the engine verbatim. The EME license document can be rendered for
//! engines that want the JWK form instead of the raw map.

use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Size of a content key and key id in bytes
const KEY_LEN: usize = 16;

/// Validated clear-key mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ClearKeyConfig {
    keys: BTreeMap<String, String>,
}

impl ClearKeyConfig {
    /// Validate and wrap a `key id -> key` map
    pub fn new(keys: BTreeMap<String, String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::InvalidKeyMaterial("no keys supplied".into()));
        }
        for (kid, key) in &keys {
            decode_key(kid).map_err(|e| Error::InvalidKeyMaterial(format!("key id {}: {}", kid, e)))?;
            decode_key(key).map_err(|e| Error::InvalidKeyMaterial(format!("key for {}: {}", kid, e)))?;
        }
        Ok(Self { keys })
    }

    /// The mapping exactly as supplied
    pub fn keys(&self) -> &BTreeMap<String, String> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check whether a key id (any case, with or without dashes) is covered
    pub fn covers(&self, kid: &str) -> bool {
        let wanted = normalize_kid(kid);
        self.keys.keys().any(|k| normalize_kid(k) == wanted)
    }

    /// Render the EME ClearKey license (JWK set)
    pub fn license_json(&self) -> serde_json::Value {
        let keys: Vec<serde_json::Value> = self
            .keys
            .iter()
            .filter_map(|(kid, key)| {
                let kid = decode_key(kid).ok()?;
                let key = decode_key(key).ok()?;
                Some(serde_json::json!({
                    "kty": "oct",
                    "kid": URL_SAFE_NO_PAD.encode(kid),
                    "k": URL_SAFE_NO_PAD.encode(key),
                }))
            })
            .collect();

        serde_json::json!({
            "keys": keys,
            "type": "temporary",
        })
    }
}

impl TryFrom<BTreeMap<String, String>> for ClearKeyConfig {
    type Error = Error;

    fn try_from(keys: BTreeMap<String, String>) -> Result<Self> {
        Self::new(keys)
    }
}

impl From<ClearKeyConfig> for BTreeMap<String, String> {
    fn from(config: ClearKeyConfig) -> Self {
        config.keys
    }
}

/// Lower-case hex with dashes and braces stripped
pub fn normalize_kid(kid: &str) -> String {
    kid.chars()
        .filter(|c| !matches!(c, '-' | '{' | '}'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn decode_key(value: &str) -> std::result::Result<[u8; KEY_LEN], String> {
    let normalized = normalize_kid(value);
    let bytes = hex::decode(&normalized).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected {} bytes, got {}", KEY_LEN, b.len()))
}
