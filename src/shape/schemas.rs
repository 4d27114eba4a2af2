//! Keep-shape schemas, one per resource kind
//!
//! Each schema lists the complete set of fields the provider may see for
//! that resource. Fields added to the B2 API later are dropped until they
//! are declared here.

use lazy_static::lazy_static;
use serde_json::json;

use super::KeepShape;

fn server_side_encryption() -> KeepShape {
    // the API never returns the SSE-C key, so `key` is not kept
    KeepShape::new().scalar("mode").scalar("algorithm")
}

fn file_version() -> KeepShape {
    KeepShape::new()
        .scalar("action")
        .scalar("bucket_id")
        .scalar("content_md5")
        .scalar("content_sha1")
        .scalar("content_type")
        .scalar("file_id")
        .with_default("file_info", json!({}))
        .scalar("file_name")
        .scalar("size")
        .scalar("source")
        .nested("server_side_encryption", server_side_encryption())
        .scalar("upload_timestamp")
}

lazy_static! {
    pub static ref ACCOUNT_INFO: KeepShape = KeepShape::new()
        .scalar("account_id")
        .scalar("account_auth_token")
        .scalar("api_url")
        .scalar("download_url")
        .scalar("s3_api_url")
        .scalar("recommended_part_size")
        .scalar("absolute_minimum_part_size")
        .nested(
            "allowed",
            KeepShape::new()
                .nested("buckets", KeepShape::new().scalar("id").scalar("name"))
                .with_default("bucket_id", json!(""))
                .with_default("bucket_name", json!(""))
                .with_default("capabilities", json!([]))
                .with_default("name_prefix", json!("")),
        );

    pub static ref APPLICATION_KEY: KeepShape = KeepShape::new()
        .scalar("application_key")
        .scalar("application_key_id")
        .with_default("bucket_id", json!(""))
        .with_default("bucket_ids", json!([]))
        .scalar("capabilities")
        .scalar("key_name")
        .with_default("name_prefix", json!(""))
        .with_default("options", json!([]))
        .scalar("expiration_timestamp");

    pub static ref BUCKET: KeepShape = KeepShape::new()
        .scalar("bucket_id")
        .scalar("bucket_name")
        .scalar("bucket_type")
        .with_default("bucket_info", json!({}))
        .nested(
            "cors_rules",
            KeepShape::new()
                .scalar("cors_rule_name")
                .scalar("allowed_origins")
                .scalar("allowed_operations")
                .scalar("max_age_seconds")
                .with_default("allowed_headers", json!([]))
                .with_default("expose_headers", json!([])),
        )
        .nested(
            "file_lock_configuration",
            KeepShape::new()
                .with_default("is_file_lock_enabled", json!(false))
                .nested(
                    "default_retention",
                    KeepShape::new()
                        .scalar("mode")
                        .nested("period", KeepShape::new().scalar("duration").scalar("unit")),
                ),
        )
        .nested("default_server_side_encryption", server_side_encryption())
        .nested(
            "lifecycle_rules",
            KeepShape::new()
                .scalar("file_name_prefix")
                .with_default("days_from_hiding_to_deleting", json!(0))
                .with_default("days_from_uploading_to_hiding", json!(0))
                .with_default(
                    "days_from_starting_to_canceling_unfinished_large_files",
                    json!(0),
                ),
        )
        .scalar("account_id")
        .with_default("options", json!([]))
        .scalar("revision");

    pub static ref FILE_VERSION: KeepShape = file_version();

    pub static ref BUCKET_FILE: KeepShape = KeepShape::new()
        .scalar("bucket_id")
        .scalar("file_name")
        .scalar("show_versions")
        .nested("file_versions", file_version());

    pub static ref BUCKET_FILES: KeepShape = KeepShape::new()
        .scalar("bucket_id")
        .scalar("folder_name")
        .scalar("show_versions")
        .scalar("recursive")
        .nested("file_versions", file_version());

    pub static ref BUCKET_FILE_SIGNED_URL: KeepShape = KeepShape::new()
        .scalar("bucket_id")
        .scalar("file_name")
        .scalar("duration")
        .scalar("signed_url");

    pub static ref BUCKET_NOTIFICATION_RULES: KeepShape = KeepShape::new()
        .scalar("bucket_id")
        .nested(
            "notification_rules",
            KeepShape::new()
                .scalar("event_types")
                .scalar("is_enabled")
                .scalar("name")
                .with_default("object_name_prefix", json!(""))
                .with_default("is_suspended", json!(false))
                .with_default("suspension_reason", json!(""))
                .nested(
                    "target_configuration",
                    KeepShape::new()
                        .scalar("target_type")
                        .scalar("url")
                        .nested(
                            "custom_headers",
                            KeepShape::new().scalar("name").scalar("value"),
                        )
                        .with_default("hmac_sha256_signing_secret", json!("")),
                ),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Field;

    #[test]
    fn test_bucket_nesting() {
        assert!(matches!(BUCKET.get("cors_rules"), Some(Field::Nested(_))));
        assert!(matches!(BUCKET.get("bucket_name"), Some(Field::Scalar)));
        match BUCKET.get("file_lock_configuration") {
            Some(Field::Nested(inner)) => {
                assert!(matches!(inner.get("default_retention"), Some(Field::Nested(_))))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_file_listings_share_file_version_shape() {
        match (BUCKET_FILE.get("file_versions"), BUCKET_FILES.get("file_versions")) {
            (Some(Field::Nested(a)), Some(Field::Nested(b))) => {
                assert_eq!(a, b);
                assert_eq!(a, &*FILE_VERSION);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_file_version_does_not_keep_sse_key() {
        match FILE_VERSION.get("server_side_encryption") {
            Some(Field::Nested(inner)) => assert!(inner.get("key").is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
