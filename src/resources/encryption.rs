//! Encryption descriptor preprocessing shared by buckets and file versions

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::b2::{EncryptionAlgorithm, EncryptionKey, EncryptionMode, EncryptionSetting};
use crate::errors::{BridgeError, Result};

use super::null_as_default;

const SSE_C_KEY_LENGTH: usize = 32;

/// Provider-side encryption block
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncryptionInput {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: Vec<KeyInput>,
}

/// Customer key, base64 encoded
#[derive(Clone, Default, Deserialize)]
pub struct KeyInput {
    #[serde(default, alias = "secretB64")]
    pub secret_b64: String,
    #[serde(default, alias = "keyId")]
    pub key_id: Option<String>,
}

impl std::fmt::Debug for KeyInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyInput")
            .field("secret_b64", &"***")
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Turn the list-of-one encryption block into a typed setting
///
/// An empty list or an empty mode means no setting was requested.
pub fn encryption_setting(input: &[EncryptionInput]) -> Result<Option<EncryptionSetting>> {
    let block = match input.first() {
        Some(block) => block,
        None => return Ok(None),
    };
    let mode = match block.mode.as_deref().filter(|m| !m.is_empty()) {
        Some(mode) => mode.parse::<EncryptionMode>()?,
        None => return Ok(None),
    };
    let algorithm = block
        .algorithm
        .as_deref()
        .filter(|a| !a.is_empty())
        .map(str::parse::<EncryptionAlgorithm>)
        .transpose()?;

    let setting = match mode {
        EncryptionMode::None => EncryptionSetting {
            mode,
            algorithm: None,
            key: None,
        },
        EncryptionMode::SseB2 => EncryptionSetting {
            mode,
            algorithm: Some(algorithm.unwrap_or(EncryptionAlgorithm::Aes256)),
            key: None,
        },
        EncryptionMode::SseC => EncryptionSetting {
            mode,
            algorithm,
            key: Some(customer_key(&block.key)?),
        },
    };
    Ok(Some(setting))
}

fn customer_key(keys: &[KeyInput]) -> Result<EncryptionKey> {
    let key = keys
        .first()
        .ok_or_else(|| BridgeError::invalid("SSE-C encryption requires a key"))?;
    let secret = STANDARD
        .decode(key.secret_b64.as_bytes())
        .map_err(|e| BridgeError::invalid(format!("Invalid base64 secret: {}", e)))?;
    if secret.len() != SSE_C_KEY_LENGTH {
        return Err(BridgeError::invalid(format!(
            "Wrong key length ({})",
            secret.len()
        )));
    }
    Ok(EncryptionKey {
        secret,
        key_id: key.key_id.clone().filter(|id| !id.is_empty()),
    })
}
