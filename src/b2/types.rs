//! B2 domain entities and request types
//!
//! Entities deserialize from the native B2 JSON (camelCase) and expose
//! their fields through [`AsMap`] for shaping. Request types serialize
//! straight into API call bodies.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{BridgeError, Result};
use crate::shape::{to_map, AsMap};

/// Deserialize `null` as the type's default value
///
/// B2 sends `null` rather than omitting unset collections, e.g.
/// `allowed.buckets` for keys not restricted to a bucket.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Authorized account session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub account_id: String,
    pub authorization_token: String,
    pub api_url: String,
    pub download_url: String,
    pub s3_api_url: String,
    pub recommended_part_size: u64,
    pub absolute_minimum_part_size: u64,
    pub allowed: Allowed,
}

/// Capabilities and restrictions of the authorizing key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowed {
    #[serde(default, deserialize_with = "null_as_default")]
    pub buckets: Vec<AllowedBucket>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub name_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedBucket {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl AsMap for Session {
    fn as_map(&self) -> Result<Map<String, Value>> {
        let first = self.allowed.buckets.first();
        let allowed = json!({
            "buckets": self.allowed.buckets,
            "bucketId": first.map(|b| b.id.clone()),
            "bucketName": first.and_then(|b| b.name.clone()),
            "capabilities": self.allowed.capabilities,
            "namePrefix": self.allowed.name_prefix,
        });
        to_map(&json!({
            "accountId": self.account_id,
            "accountAuthToken": self.authorization_token,
            "apiUrl": self.api_url,
            "downloadUrl": self.download_url,
            "s3ApiUrl": self.s3_api_url,
            "recommendedPartSize": self.recommended_part_size,
            "absoluteMinimumPartSize": self.absolute_minimum_part_size,
            "allowed": allowed,
        }))
    }
}

/// Server-side encryption mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMode {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "SSE-B2")]
    SseB2,
    #[serde(rename = "SSE-C")]
    SseC,
}

impl FromStr for EncryptionMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(EncryptionMode::None),
            "SSE-B2" => Ok(EncryptionMode::SseB2),
            "SSE-C" => Ok(EncryptionMode::SseC),
            _ => Err(BridgeError::invalid(format!("Unknown encryption mode: {}", s))),
        }
    }
}

/// Server-side encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "AES256")]
    Aes256,
}

impl FromStr for EncryptionAlgorithm {
    type Err = BridgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AES256" => Ok(EncryptionAlgorithm::Aes256),
            _ => Err(BridgeError::invalid(format!(
                "Unknown encryption algorithm: {}",
                s
            ))),
        }
    }
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256 => "AES256",
        }
    }
}

/// Customer-provided key for SSE-C
#[derive(Clone, PartialEq)]
pub struct EncryptionKey {
    pub secret: Vec<u8>,
    pub key_id: Option<String>,
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("secret", &"***")
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Typed encryption setting sent to the API
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionSetting {
    pub mode: EncryptionMode,
    pub algorithm: Option<EncryptionAlgorithm>,
    pub key: Option<EncryptionKey>,
}

impl EncryptionSetting {
    /// Body representation used for bucket default encryption
    pub fn to_api_value(&self) -> Value {
        let mut value = json!({ "mode": self.mode });
        if let Some(algorithm) = self.algorithm {
            value["algorithm"] = json!(algorithm);
        }
        value
    }
}

/// `{isClientAuthorizedToRead, value}` wrapper used by bucket settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorized<T> {
    #[serde(default)]
    pub is_client_authorized_to_read: bool,
    #[serde(default)]
    pub value: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLockConfiguration {
    #[serde(default)]
    pub is_file_lock_enabled: Option<bool>,
    #[serde(default)]
    pub default_retention: Option<Value>,
}

/// Bucket as returned by `b2_list_buckets` and friends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub account_id: String,
    pub bucket_id: String,
    pub bucket_name: String,
    pub bucket_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bucket_info: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cors_rules: Vec<Value>,
    #[serde(default)]
    pub default_server_side_encryption: Option<Authorized<Value>>,
    #[serde(default)]
    pub file_lock_configuration: Option<Authorized<FileLockConfiguration>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lifecycle_rules: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    #[serde(default)]
    pub revision: u64,
}

impl AsMap for Bucket {
    /// Flattens the authorization wrappers so encryption and file lock
    /// settings appear as plain top-level fields.
    fn as_map(&self) -> Result<Map<String, Value>> {
        let encryption = self
            .default_server_side_encryption
            .as_ref()
            .and_then(|wrapped| wrapped.value.clone())
            .unwrap_or(Value::Null);
        let lock = self
            .file_lock_configuration
            .as_ref()
            .and_then(|wrapped| wrapped.value.clone())
            .unwrap_or_default();

        to_map(&json!({
            "accountId": self.account_id,
            "bucketId": self.bucket_id,
            "bucketName": self.bucket_name,
            "bucketType": self.bucket_type,
            "bucketInfo": self.bucket_info,
            "corsRules": self.cors_rules,
            "defaultServerSideEncryption": encryption,
            "isFileLockEnabled": lock.is_file_lock_enabled,
            "defaultRetention": lock.default_retention,
            "lifecycleRules": self.lifecycle_rules,
            "options": self.options,
            "revision": self.revision,
        }))
    }
}

/// Bucket lookup filter for `b2_list_buckets`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
}

/// Arguments of `b2_create_bucket`
#[derive(Debug, Clone, PartialEq)]
pub struct NewBucket {
    pub bucket_name: String,
    pub bucket_type: String,
    pub bucket_info: Map<String, Value>,
    pub cors_rules: Vec<Value>,
    pub file_lock_enabled: bool,
    pub lifecycle_rules: Vec<Value>,
    pub default_server_side_encryption: Option<EncryptionSetting>,
}

impl NewBucket {
    pub fn to_api_body(&self, account_id: &str) -> Value {
        let mut body = json!({
            "accountId": account_id,
            "bucketName": self.bucket_name,
            "bucketType": self.bucket_type,
            "bucketInfo": self.bucket_info,
            "corsRules": self.cors_rules,
            "fileLockEnabled": self.file_lock_enabled,
            "lifecycleRules": self.lifecycle_rules,
        });
        if let Some(encryption) = &self.default_server_side_encryption {
            body["defaultServerSideEncryption"] = encryption.to_api_value();
        }
        body
    }
}

/// Arguments of `b2_update_bucket`; `None` leaves a setting unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketUpdate {
    pub bucket_id: String,
    pub bucket_type: Option<String>,
    pub bucket_info: Option<Map<String, Value>>,
    pub cors_rules: Option<Vec<Value>>,
    pub default_retention: Option<Value>,
    pub default_server_side_encryption: Option<EncryptionSetting>,
    pub lifecycle_rules: Option<Vec<Value>>,
}

impl BucketUpdate {
    pub fn to_api_body(&self, account_id: &str) -> Value {
        let mut body = json!({
            "accountId": account_id,
            "bucketId": self.bucket_id,
        });
        if let Some(bucket_type) = &self.bucket_type {
            body["bucketType"] = json!(bucket_type);
        }
        if let Some(bucket_info) = &self.bucket_info {
            body["bucketInfo"] = json!(bucket_info);
        }
        if let Some(cors_rules) = &self.cors_rules {
            body["corsRules"] = json!(cors_rules);
        }
        if let Some(default_retention) = &self.default_retention {
            body["defaultRetention"] = default_retention.clone();
        }
        if let Some(encryption) = &self.default_server_side_encryption {
            body["defaultServerSideEncryption"] = encryption.to_api_value();
        }
        if let Some(lifecycle_rules) = &self.lifecycle_rules {
            body["lifecycleRules"] = json!(lifecycle_rules);
        }
        body
    }
}

/// Application key as returned by `b2_list_keys` / `b2_create_key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationKey {
    pub application_key_id: String,
    /// Only present in the `b2_create_key` response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_key: Option<String>,
    pub key_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub bucket_ids: Option<Vec<String>>,
    #[serde(default)]
    pub name_prefix: Option<String>,
    #[serde(default)]
    pub expiration_timestamp: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
}

impl AsMap for ApplicationKey {
    fn as_map(&self) -> Result<Map<String, Value>> {
        let mut map = to_map(self)?;
        let first = self
            .bucket_ids
            .as_ref()
            .and_then(|ids| ids.first())
            .cloned()
            .unwrap_or_default();
        map.insert("bucketId".to_string(), Value::String(first));
        Ok(map)
    }
}

/// One page of `b2_list_keys`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub keys: Vec<ApplicationKey>,
    #[serde(default)]
    pub next_application_key_id: Option<String>,
}

/// Arguments of `b2_create_key`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKey {
    pub key_name: String,
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_duration_in_seconds: Option<u64>,
}

/// A file version or folder entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub action: String,
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default)]
    pub content_md5: Option<String>,
    #[serde(default)]
    pub content_sha1: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_info: Map<String, Value>,
    pub file_name: String,
    #[serde(rename(serialize = "size", deserialize = "contentLength"), default)]
    pub size: u64,
    #[serde(default)]
    pub server_side_encryption: Option<Value>,
    #[serde(default)]
    pub upload_timestamp: i64,
}

impl AsMap for FileVersion {
    fn as_map(&self) -> Result<Map<String, Value>> {
        to_map(self)
    }
}

/// One page of a file listing
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<FileVersion>,
    #[serde(default)]
    pub next_file_name: Option<String>,
    #[serde(default)]
    pub next_file_id: Option<String>,
}

/// Arguments of `b2_list_file_versions` / `b2_list_file_names`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFiles {
    pub bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,
}

/// Single-part upload of an in-memory body
#[derive(Debug, Clone)]
pub struct Upload {
    pub bucket_id: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub file_info: Map<String, Value>,
    pub data: Bytes,
    pub encryption: Option<EncryptionSetting>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfiguration {
    pub target_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<Vec<CustomHeader>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac_sha256_signing_secret: Option<String>,
}

/// Event notification rule of a bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    pub event_types: Vec<String>,
    pub is_enabled: bool,
    pub name: String,
    #[serde(default)]
    pub object_name_prefix: String,
    pub target_configuration: TargetConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_suspended: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
}

impl AsMap for NotificationRule {
    fn as_map(&self) -> Result<Map<String, Value>> {
        to_map(self)
    }
}
