//! Pre-signed download URL data source

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::b2::{download_url_for, get_bucket_by_id, B2Api};
use crate::errors::Result;
use crate::shape::schemas::BUCKET_FILE_SIGNED_URL;
use crate::shape::shape;

use super::{parse, unsupported, Operation, ResourceHandler};

#[derive(Debug, Deserialize)]
struct SignRequest {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(alias = "fileName")]
    file_name: String,
    duration: u64,
}

/// Time-limited download URL for one file
pub struct BucketFileSignedUrl;

impl BucketFileSignedUrl {
    async fn data_source_read(
        &self,
        api: &dyn B2Api,
        args: SignRequest,
    ) -> Result<Map<String, Value>> {
        let bucket = get_bucket_by_id(api, &args.bucket_id).await?;
        let token = api
            .get_download_authorization(&bucket.bucket_id, &args.file_name, args.duration)
            .await?;
        let base_url = download_url_for(api.session()?, &bucket.bucket_name, &args.file_name);
        debug!(
            bucket_name = %bucket.bucket_name,
            file_name = %args.file_name,
            duration = args.duration,
            "Signed download URL"
        );

        let raw = json!({
            "bucketId": args.bucket_id,
            "fileName": args.file_name,
            "duration": args.duration,
            "signedUrl": format!("{}?Authorization={}", base_url, token),
        });
        shape(&raw, &BUCKET_FILE_SIGNED_URL)
    }
}

#[async_trait]
impl ResourceHandler for BucketFileSignedUrl {
    fn ident(&self) -> &'static str {
        "BucketFileSignedUrl"
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
            Operation::ResourceCreate
            | Operation::ResourceRead
            | Operation::ResourceUpdate
            | Operation::ResourceDelete => Err(unsupported(
                self.ident(),
                operation,
                "signed URLs are a data source",
            )),
        }
    }
}
