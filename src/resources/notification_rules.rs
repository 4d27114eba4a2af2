//! Bucket event notification rules

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::b2::{B2Api, CustomHeader, NotificationRule, TargetConfiguration};
use crate::errors::{BridgeError, Result};
use crate::shape::schemas::BUCKET_NOTIFICATION_RULES;
use crate::shape::{shape, AsMap};

use super::{is_missing_bucket, non_empty, null_as_default, parse, Operation, ResourceHandler};

#[derive(Debug, Deserialize)]
struct ByBucket {
    #[serde(alias = "bucketId")]
    bucket_id: String,
}

#[derive(Debug, Deserialize)]
struct SetRules {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(
        default,
        alias = "notificationRules",
        deserialize_with = "null_as_default"
    )]
    notification_rules: Vec<RuleInput>,
}

#[derive(Debug, Deserialize)]
struct RuleInput {
    #[serde(alias = "eventTypes")]
    event_types: Vec<String>,
    #[serde(alias = "isEnabled")]
    is_enabled: bool,
    name: String,
    #[serde(default, alias = "objectNamePrefix")]
    object_name_prefix: Option<String>,
    #[serde(
        default,
        alias = "targetConfiguration",
        deserialize_with = "null_as_default"
    )]
    target_configuration: Vec<TargetInput>,
}

#[derive(Deserialize)]
struct TargetInput {
    #[serde(alias = "targetType")]
    target_type: String,
    url: String,
    #[serde(default, alias = "customHeaders", deserialize_with = "null_as_default")]
    custom_headers: Vec<CustomHeader>,
    #[serde(default, alias = "hmacSha256SigningSecret")]
    hmac_sha256_signing_secret: Option<String>,
}

impl std::fmt::Debug for TargetInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetInput")
            .field("target_type", &self.target_type)
            .field("url", &self.url)
            .field("custom_headers", &self.custom_headers.len())
            .finish_non_exhaustive()
    }
}

impl RuleInput {
    /// Flatten the list-of-one target block; suspension state is reset
    fn into_rule(self) -> Result<NotificationRule> {
        let target = self.target_configuration.into_iter().next().ok_or_else(|| {
            BridgeError::invalid(format!(
                "notification rule {} has no target_configuration",
                self.name
            ))
        })?;

        Ok(NotificationRule {
            event_types: self.event_types,
            is_enabled: self.is_enabled,
            name: self.name,
            object_name_prefix: self.object_name_prefix.unwrap_or_default(),
            target_configuration: TargetConfiguration {
                target_type: target.target_type,
                url: target.url,
                custom_headers: if target.custom_headers.is_empty() {
                    None
                } else {
                    Some(target.custom_headers)
                },
                hmac_sha256_signing_secret: non_empty(target.hmac_sha256_signing_secret),
            },
            is_suspended: None,
            suspension_reason: None,
        })
    }
}

fn shape_rules(bucket_id: &str, rules: &[NotificationRule]) -> Result<Map<String, Value>> {
    let rules = rules
        .iter()
        .map(|rule| rule.as_map().map(Value::Object))
        .collect::<Result<Vec<_>>>()?;
    let raw = json!({
        "bucketId": bucket_id,
        "notificationRules": rules,
    });
    shape(&raw, &BUCKET_NOTIFICATION_RULES)
}

/// Event notification rules of one bucket, managed as a whole
pub struct BucketNotificationRules;

impl BucketNotificationRules {
    async fn read(&self, api: &dyn B2Api, args: ByBucket) -> Result<Map<String, Value>> {
        let rules = api.get_notification_rules(&args.bucket_id).await?;
        shape_rules(&args.bucket_id, &rules)
    }

    async fn resource_read(&self, api: &dyn B2Api, args: ByBucket) -> Result<Map<String, Value>> {
        match api.get_notification_rules(&args.bucket_id).await {
            Ok(rules) => shape_rules(&args.bucket_id, &rules),
            Err(e) if is_missing_bucket(&e) => {
                debug!(bucket_id = %args.bucket_id, "Bucket is gone");
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn set(&self, api: &dyn B2Api, args: SetRules) -> Result<Map<String, Value>> {
        let rules = args
            .notification_rules
            .into_iter()
            .map(RuleInput::into_rule)
            .collect::<Result<Vec<_>>>()?;
        info!(bucket_id = %args.bucket_id, rules = rules.len(), "Setting notification rules");
        let rules = api.set_notification_rules(&args.bucket_id, rules).await?;
        shape_rules(&args.bucket_id, &rules)
    }

    async fn resource_delete(&self, api: &dyn B2Api, args: ByBucket) -> Result<Map<String, Value>> {
        info!(bucket_id = %args.bucket_id, "Removing notification rules");
        match api.set_notification_rules(&args.bucket_id, Vec::new()).await {
            Ok(_) => Ok(Map::new()),
            Err(e) if e.api_code() == Some("bad_bucket_id") => {
                debug!(bucket_id = %args.bucket_id, "Bucket already gone");
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ResourceHandler for BucketNotificationRules {
    fn ident(&self) -> &'static str {
        "BucketNotificationRules"
    }

    #[instrument(skip(self, api, payload))]
    async fn call(
        &self,
        operation: Operation,
        api: &dyn B2Api,
        payload: Value,
    ) -> Result<Map<String, Value>> {
        match operation {
            Operation::DataSourceRead => self.read(api, parse(payload)?).await,
            Operation::ResourceRead => self.resource_read(api, parse(payload)?).await,
            Operation::ResourceCreate | Operation::ResourceUpdate => {
                self.set(api, parse(payload)?).await
            }
            Operation::ResourceDelete => self.resource_delete(api, parse(payload)?).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::b2::fake::FakeB2Api;

    fn api() -> FakeB2Api {
        let api = FakeB2Api::authorized();
        api.insert_bucket(FakeB2Api::bucket("b1", "my-bucket"));
        api
    }

    fn rules_payload() -> Value {
        json!({
            "bucket_id": "b1",
            "notification_rules": [{
                "name": "on-upload",
                "event_types": ["b2:ObjectCreated:*"],
                "is_enabled": true,
                "object_name_prefix": "",
                "is_suspended": true,
                "suspension_reason": "stale",
                "target_configuration": [{
                    "target_type": "webhook",
                    "url": "https://example.com/hook",
                    "custom_headers": [{"name": "X-Team", "value": "storage"}],
                    "hmac_sha256_signing_secret": ""
                }]
            }]
        })
    }

    #[tokio::test]
    async fn test_create_sets_and_shapes_rules() {
        let api = api();
        let result = BucketNotificationRules
            .call(Operation::ResourceCreate, &api, rules_payload())
            .await
            .unwrap();

        assert_eq!(result["bucket_id"], "b1");
        assert_eq!(
            result["notification_rules"],
            json!([{
                "name": "on-upload",
                "event_types": ["b2:ObjectCreated:*"],
                "is_enabled": true,
                "object_name_prefix": "",
                "is_suspended": false,
                "suspension_reason": "",
                "target_configuration": [{
                    "target_type": "webhook",
                    "url": "https://example.com/hook",
                    "custom_headers": [{"name": "X-Team", "value": "storage"}],
                    "hmac_sha256_signing_secret": ""
                }]
            }])
        );

        let stored = api.rules("b1").unwrap();
        assert!(stored[0].target_configuration.hmac_sha256_signing_secret.is_none());
    }

    #[tokio::test]
    async fn test_rule_without_target_is_rejected() {
        let api = api();
        let mut payload = rules_payload();
        payload["notification_rules"][0]["target_configuration"] = json!([]);
        let err = BucketNotificationRules
            .call(Operation::ResourceUpdate, &api, payload)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
        assert_eq!(api.calls_to("set_notification_rules"), 0);
    }

    #[tokio::test]
    async fn test_reads() {
        let api = api();
        BucketNotificationRules
            .call(Operation::ResourceCreate, &api, rules_payload())
            .await
            .unwrap();

        let result = BucketNotificationRules
            .call(Operation::DataSourceRead, &api, json!({"bucket_id": "b1"}))
            .await
            .unwrap();
        assert_eq!(result["notification_rules"].as_array().unwrap().len(), 1);

        let result = BucketNotificationRules
            .call(Operation::ResourceRead, &api, json!({"bucket_id": "gone"}))
            .await
            .unwrap();
        assert!(result.is_empty());

        let err = BucketNotificationRules
            .call(Operation::DataSourceRead, &api, json!({"bucket_id": "gone"}))
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some("bad_bucket_id"));
    }

    #[tokio::test]
    async fn test_delete_clears_rules() {
        let api = api();
        BucketNotificationRules
            .call(Operation::ResourceCreate, &api, rules_payload())
            .await
            .unwrap();
        let result = BucketNotificationRules
            .call(Operation::ResourceDelete, &api, json!({"bucket_id": "b1"}))
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(api.rules("b1"), Some(vec![]));
    }

    #[tokio::test]
    async fn test_delete_tolerates_only_bad_bucket_id() {
        let api = api();
        let result = BucketNotificationRules
            .call(Operation::ResourceDelete, &api, json!({"bucket_id": "gone"}))
            .await
            .unwrap();
        assert!(result.is_empty());

        api.fail("set_notification_rules", 404, "not_found");
        let err = BucketNotificationRules
            .call(Operation::ResourceDelete, &api, json!({"bucket_id": "b1"}))
            .await
            .unwrap_err();
        assert_eq!(err.api_code(), Some("not_found"));
    }
}
