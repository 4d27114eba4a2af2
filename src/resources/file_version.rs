//! File version resource: uploads a local file as one B2 file version

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::b2::{get_bucket_by_id, B2Api, Upload};
use crate::errors::{BridgeError, Result};
use crate::shape::schemas::FILE_VERSION;
use crate::shape::{shape, AsMap};

use super::encryption::{encryption_setting, EncryptionInput};
use super::{non_empty, null_as_default, parse, unsupported, Operation, ResourceHandler};

#[derive(Debug, Deserialize)]
struct CreateFileVersion {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(alias = "fileName")]
    file_name: String,
    source: String,
    #[serde(default, alias = "contentType")]
    content_type: Option<String>,
    #[serde(default, alias = "fileInfo", deserialize_with = "null_as_default")]
    file_info: Map<String, Value>,
    #[serde(
        default,
        alias = "serverSideEncryption",
        deserialize_with = "null_as_default"
    )]
    server_side_encryption: Vec<EncryptionInput>,
}

#[derive(Debug, Deserialize)]
struct ReadFileVersion {
    #[serde(alias = "fileId")]
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteFileVersion {
    #[serde(alias = "fileId")]
    file_id: String,
    #[serde(alias = "fileName")]
    file_name: String,
}

/// Single file versions
pub struct BucketFileVersion;

impl BucketFileVersion {
    async fn resource_create(
        &self,
        api: &dyn B2Api,
        args: CreateFileVersion,
    ) -> Result<Map<String, Value>> {
        let bucket = get_bucket_by_id(api, &args.bucket_id).await?;
        let encryption = encryption_setting(&args.server_side_encryption)?;
        let data = tokio::fs::read(&args.source).await.map_err(|e| {
            BridgeError::invalid(format!("cannot read source {}: {}", args.source, e))
        })?;

        info!(
            bucket_name = %bucket.bucket_name,
            file_name = %args.file_name,
            size = data.len(),
            "Uploading file version"
        );
        let version = api
            .upload_file(Upload {
                bucket_id: bucket.bucket_id,
                file_name: args.file_name,
                content_type: non_empty(args.content_type),
                file_info: args.file_info,
                data: Bytes::from(data),
                encryption,
            })
            .await?;

        let mut raw = version.as_map()?;
        raw.insert("bucketId".to_string(), Value::String(args.bucket_id));
        raw.insert("source".to_string(), Value::String(args.source));
        shape(&Value::Object(raw), &FILE_VERSION)
    }

    async fn resource_read(
        &self,
        api: &dyn B2Api,
        args: ReadFileVersion,
    ) -> Result<Map<String, Value>> {
        match api.get_file_info(&args.file_id).await {
            Ok(version) => shape(&Value::Object(version.as_map()?), &FILE_VERSION),
            Err(e) if e.is_not_found() => {
                debug!(file_id = %args.file_id, "File version is gone");
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn resource_delete(
        &self,
        api: &dyn B2Api,
        args: DeleteFileVersion,
    ) -> Result<Map<String, Value>> {
        info!(file_id = %args.file_id, file_name = %args.file_name, "Deleting file version");
        api.delete_file_version(&args.file_name, &args.file_id).await?;
        Ok(Map::new())
    }
}

#[async_trait]
impl ResourceHandler for BucketFileVersion {
    fn ident(&self) -> &'static str {
        "BucketFileVersion"
    }

    #[instrument(skip(self, api, payload))]
    async fn call(
        &self,
        operation: Operation,
        api: &dyn B2Api,
        payload: Value,
    ) -> Result<Map<String, Value>> {
        match operation {
            Operation::ResourceCreate => self.resource_create(api, parse(payload)?).await,
            Operation::ResourceRead => self.resource_read(api, parse(payload)?).await,
            Operation::ResourceDelete => self.resource_delete(api, parse(payload)?).await,
            Operation::ResourceUpdate => Err(unsupported(
                self.ident(),
                operation,
                "file versions are immutable",
            )),
            Operation::DataSourceRead => Err(unsupported(
                self.ident(),
                operation,
                "use bucket_file to look files up",
            )),
        }
    }
}
