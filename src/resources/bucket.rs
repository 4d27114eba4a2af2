//! Bucket resource and data source
//!
//! Provider blocks are flattened into B2 call arguments before the call
//! and B2 buckets are shaped back into provider blocks after it:
//! - CORS and lifecycle rule keys are camelized
//! - `file_lock_configuration` becomes `fileLockEnabled` plus a separate
//!   default retention, which only `b2_update_bucket` can set
//! - CORS `allowed_operations` come back in the order the caller wrote them

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::b2::{
    get_bucket_by_id, get_bucket_by_name, B2Api, Bucket, BucketUpdate, EncryptionMode,
    EncryptionSetting, NewBucket,
};
use crate::errors::{BridgeError, Result};
use crate::keys::{change_keys, to_camel, to_snake};
use crate::shape::schemas::BUCKET;
use crate::shape::{shape, AsMap};

use super::encryption::{encryption_setting, EncryptionInput};
use super::{null_as_default, parse, Operation, ResourceHandler};

const LIFECYCLE_DAY_FIELDS: [&str; 3] = [
    "days_from_hiding_to_deleting",
    "days_from_uploading_to_hiding",
    "days_from_starting_to_canceling_unfinished_large_files",
];

#[derive(Debug, Deserialize)]
struct ByName {
    #[serde(alias = "bucketName")]
    bucket_name: String,
}

#[derive(Debug, Deserialize)]
struct ById {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(default, alias = "corsRules", deserialize_with = "null_as_default")]
    cors_rules: Vec<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RetentionInput {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    period: Value,
}

#[derive(Debug, Default, Deserialize)]
struct FileLockInput {
    #[serde(default, alias = "isFileLockEnabled")]
    is_file_lock_enabled: Option<bool>,
    #[serde(default, alias = "defaultRetention", deserialize_with = "null_as_default")]
    default_retention: Vec<RetentionInput>,
}

/// Settings shared by create and update
#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default, alias = "bucketInfo")]
    bucket_info: Option<Map<String, Value>>,
    #[serde(default, alias = "corsRules")]
    cors_rules: Option<Vec<Map<String, Value>>>,
    #[serde(
        default,
        alias = "fileLockConfiguration",
        deserialize_with = "null_as_default"
    )]
    file_lock_configuration: Vec<FileLockInput>,
    #[serde(
        default,
        alias = "defaultServerSideEncryption",
        deserialize_with = "null_as_default"
    )]
    default_server_side_encryption: Vec<EncryptionInput>,
    #[serde(default, alias = "lifecycleRules")]
    lifecycle_rules: Option<Vec<Map<String, Value>>>,
}

#[derive(Debug, Deserialize)]
struct CreateBucket {
    #[serde(alias = "bucketName")]
    bucket_name: String,
    #[serde(alias = "bucketType")]
    bucket_type: String,
    #[serde(flatten)]
    settings: Settings,
}

#[derive(Debug, Deserialize)]
struct UpdateBucket {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(default, alias = "accountId")]
    account_id: Option<String>,
    #[serde(default, alias = "bucketType")]
    bucket_type: Option<String>,
    #[serde(flatten)]
    settings: Settings,
}

#[derive(Debug, Deserialize)]
struct DeleteBucket {
    #[serde(alias = "bucketId")]
    bucket_id: String,
}

/// Settings translated into B2 call arguments
#[derive(Debug, Default)]
struct Prepared {
    bucket_info: Option<Map<String, Value>>,
    cors_rules: Option<Vec<Value>>,
    is_file_lock_enabled: Option<bool>,
    default_retention: Option<Value>,
    default_server_side_encryption: Option<EncryptionSetting>,
    lifecycle_rules: Option<Vec<Value>>,
}

impl Prepared {
    /// Retention that actually locks files, as opposed to `{"mode": null}`
    fn requested_retention(&self) -> Option<&Value> {
        self.default_retention
            .as_ref()
            .filter(|retention| !retention["mode"].is_null())
    }
}

fn preprocess(settings: Settings) -> Result<Prepared> {
    let mut prepared = Prepared {
        bucket_info: settings.bucket_info,
        ..Default::default()
    };

    prepared.cors_rules = settings.cors_rules.map(|rules| {
        rules
            .into_iter()
            .map(|rule| Value::Object(change_keys(rule, to_camel)))
            .collect()
    });

    for lock in settings.file_lock_configuration {
        if lock.is_file_lock_enabled.is_some() {
            prepared.is_file_lock_enabled = lock.is_file_lock_enabled;
        }
        for retention in lock.default_retention {
            prepared.default_retention = Some(retention_value(retention));
        }
    }
    if prepared.requested_retention().is_some() && prepared.is_file_lock_enabled != Some(true) {
        return Err(BridgeError::invalid(
            "default_retention can only be set when is_file_lock_enabled is true",
        ));
    }

    prepared.default_server_side_encryption =
        encryption_setting(&settings.default_server_side_encryption)?;
    if let Some(EncryptionSetting {
        mode: EncryptionMode::SseC,
        ..
    }) = prepared.default_server_side_encryption
    {
        return Err(BridgeError::invalid(
            "SSE-C cannot be used as bucket default encryption",
        ));
    }

    prepared.lifecycle_rules = settings.lifecycle_rules.map(|rules| {
        rules
            .into_iter()
            .map(|mut rule| {
                for field in LIFECYCLE_DAY_FIELDS {
                    if rule.get(field).and_then(Value::as_i64) == Some(0) {
                        rule.insert(field.to_string(), Value::Null);
                    }
                }
                Value::Object(change_keys(rule, to_camel))
            })
            .collect()
    });

    Ok(prepared)
}

fn retention_value(retention: RetentionInput) -> Value {
    let mode = retention.mode.filter(|m| !m.is_empty());
    if mode.is_none() {
        return json!({"mode": null});
    }
    let period = match retention.period {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => Value::Null,
        other => other,
    };
    let period = match period {
        Value::Object(map) => Value::Object(change_keys(map, to_camel)),
        other => other,
    };
    json!({"mode": mode, "period": period})
}

/// Shape a bucket into the provider block
///
/// `requested_cors` are the caller's CORS rules; operations of a rule with
/// the same name are put back into the caller's order.
fn postprocess(
    bucket: &Bucket,
    requested_cors: &[Map<String, Value>],
) -> Result<Map<String, Value>> {
    let mut raw = bucket.as_map()?;

    let mut lock = Map::new();
    for key in ["isFileLockEnabled", "defaultRetention"] {
        match raw.remove(key) {
            None | Some(Value::Null) => {}
            Some(value) if value == json!({"mode": null}) => {}
            Some(value) => {
                lock.insert(key.to_string(), value);
            }
        }
    }
    raw.insert("fileLockConfiguration".to_string(), Value::Object(lock));

    let mut shaped = shape(&Value::Object(raw), &BUCKET)?;
    if let Some(Value::Array(rules)) = shaped.get_mut("cors_rules") {
        reorder_cors_operations(rules, requested_cors);
    }
    Ok(shaped)
}

fn reorder_cors_operations(rules: &mut [Value], requested: &[Map<String, Value>]) {
    let requested: Vec<Map<String, Value>> = requested
        .iter()
        .map(|rule| change_keys(rule.clone(), to_snake))
        .collect();

    for rule in rules.iter_mut() {
        let wanted = requested
            .iter()
            .find(|r| r.get("cors_rule_name") == rule.get("cors_rule_name"))
            .and_then(|r| r.get("allowed_operations"))
            .and_then(Value::as_array);
        let wanted = match wanted {
            Some(wanted) => wanted,
            None => continue,
        };
        if let Some(Value::Array(operations)) = rule.get_mut("allowed_operations") {
            *operations = reorder_operations(operations, wanted);
        }
    }
}

/// Caller's operations first in the caller's order, the rest in API order
fn reorder_operations(actual: &[Value], wanted: &[Value]) -> Vec<Value> {
    let mut ordered: Vec<Value> = wanted
        .iter()
        .filter(|op| actual.contains(op))
        .cloned()
        .collect();
    ordered.extend(actual.iter().filter(|op| !wanted.contains(op)).cloned());
    ordered
}

/// Buckets
pub struct BucketResource;

impl BucketResource {
    async fn data_source_read(&self, api: &dyn B2Api, args: ByName) -> Result<Map<String, Value>> {
        let bucket = get_bucket_by_name(api, &args.bucket_name).await?;
        postprocess(&bucket, &[])
    }

    async fn resource_create(
        &self,
        api: &dyn B2Api,
        args: CreateBucket,
    ) -> Result<Map<String, Value>> {
        let requested_cors = args.settings.cors_rules.clone().unwrap_or_default();
        let prepared = preprocess(args.settings)?;
        let retention = prepared.requested_retention().cloned();

        info!(bucket_name = %args.bucket_name, bucket_type = %args.bucket_type, "Creating bucket");
        let mut bucket = api
            .create_bucket(NewBucket {
                bucket_name: args.bucket_name,
                bucket_type: args.bucket_type,
                bucket_info: prepared.bucket_info.unwrap_or_default(),
                cors_rules: prepared.cors_rules.unwrap_or_default(),
                file_lock_enabled: prepared.is_file_lock_enabled.unwrap_or(false),
                lifecycle_rules: prepared.lifecycle_rules.unwrap_or_default(),
                default_server_side_encryption: prepared.default_server_side_encryption,
            })
            .await?;

        // b2_create_bucket does not take a default retention
        if let Some(retention) = retention {
            debug!(bucket_id = %bucket.bucket_id, "Setting default retention");
            api.update_bucket(BucketUpdate {
                bucket_id: bucket.bucket_id.clone(),
                default_retention: Some(retention),
                ..Default::default()
            })
            .await?;
            bucket = get_bucket_by_id(api, &bucket.bucket_id).await?;
        }

        postprocess(&bucket, &requested_cors)
    }

    async fn resource_read(&self, api: &dyn B2Api, args: ById) -> Result<Map<String, Value>> {
        match get_bucket_by_id(api, &args.bucket_id).await {
            Ok(bucket) => postprocess(&bucket, &args.cors_rules),
            Err(e) if e.is_not_found() => {
                debug!(bucket_id = %args.bucket_id, "Bucket is gone");
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn resource_update(
        &self,
        api: &dyn B2Api,
        args: UpdateBucket,
    ) -> Result<Map<String, Value>> {
        let requested_cors = args.settings.cors_rules.clone().unwrap_or_default();
        let prepared = preprocess(args.settings)?;
        if prepared.is_file_lock_enabled.is_some() {
            debug!(
                bucket_id = %args.bucket_id,
                "File lock can only be enabled at creation, ignoring"
            );
        }

        info!(bucket_id = %args.bucket_id, account_id = ?args.account_id, "Updating bucket");
        api.update_bucket(BucketUpdate {
            bucket_id: args.bucket_id.clone(),
            bucket_type: args.bucket_type,
            bucket_info: prepared.bucket_info,
            cors_rules: prepared.cors_rules,
            default_retention: prepared.default_retention,
            default_server_side_encryption: prepared.default_server_side_encryption,
            lifecycle_rules: prepared.lifecycle_rules,
        })
        .await?;

        let bucket = get_bucket_by_id(api, &args.bucket_id).await?;
        postprocess(&bucket, &requested_cors)
    }

    async fn resource_delete(
        &self,
        api: &dyn B2Api,
        args: DeleteBucket,
    ) -> Result<Map<String, Value>> {
        let bucket = get_bucket_by_id(api, &args.bucket_id).await?;
        info!(bucket_id = %bucket.bucket_id, bucket_name = %bucket.bucket_name, "Deleting bucket");
        match api.delete_bucket(&bucket.bucket_id).await {
            Ok(()) => {}
            Err(e) if e.api_code() == Some("bad_bucket_id") => {
                warn!(bucket_id = %bucket.bucket_id, "Bucket was already deleted");
            }
            Err(e) => return Err(e),
        }
        Ok(Map::new())
    }
}

#[async_trait]
impl ResourceHandler for BucketResource {
    fn ident(&self) -> &'static str {
        "Bucket"
    }

    #[instrument(skip(self, api, payload))]
    async fn call(
        &self,
        operation: Operation,
        api: &dyn B2Api,
        payload: Value,
    ) -> Result<Map<String, Value>> {
        match operation {
            Operation::DataSourceRead => self.data_source_read(api, parse(payload)?).await,
            Operation::ResourceCreate => self.resource_create(api, parse(payload)?).await,
            Operation::ResourceRead => self.resource_read(api, parse(payload)?).await,
            Operation::ResourceUpdate => self.resource_update(api, parse(payload)?).await,
            Operation::ResourceDelete => self.resource_delete(api, parse(payload)?).await,
        }
    }
}
