//! File listing data sources
//!
//! Both listings read B2 lazily: pages are fetched only while the
//! listing still needs entries.

use async_trait::async_trait;
use futures::{future, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::b2::{get_bucket_by_id, list_files, B2Api, FileVersion, ListFiles, Listing};
use crate::errors::Result;
use crate::shape::schemas::{BUCKET_FILE, BUCKET_FILES};
use crate::shape::{shape, AsMap};

use super::{parse, unsupported, Operation, ResourceHandler};

#[derive(Debug, Deserialize)]
struct FileQuery {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(alias = "fileName")]
    file_name: String,
    #[serde(default, alias = "showVersions")]
    show_versions: bool,
}

#[derive(Debug, Deserialize)]
struct FilesQuery {
    #[serde(alias = "bucketId")]
    bucket_id: String,
    #[serde(default, alias = "folderName")]
    folder_name: String,
    #[serde(default, alias = "showVersions")]
    show_versions: bool,
    #[serde(default)]
    recursive: bool,
}

fn listing(show_versions: bool) -> Listing {
    if show_versions {
        Listing::AllVersions
    } else {
        Listing::LatestOnly
    }
}

fn project(versions: &[FileVersion]) -> Result<Vec<Value>> {
    versions
        .iter()
        .map(|version| version.as_map().map(Value::Object))
        .collect()
}

/// Folder prefix as B2 expects it: empty, or ending in `/`
fn folder_prefix(folder_name: &str) -> String {
    if folder_name.is_empty() || folder_name.ends_with('/') {
        folder_name.to_string()
    } else {
        format!("{}/", folder_name)
    }
}

/// One file by exact name: its latest version or its whole history
pub struct BucketFile;

impl BucketFile {
    async fn data_source_read(
        &self,
        api: &dyn B2Api,
        args: FileQuery,
    ) -> Result<Map<String, Value>> {
        let bucket = get_bucket_by_id(api, &args.bucket_id).await?;
        let request = ListFiles {
            bucket_id: bucket.bucket_id,
            start_file_name: Some(args.file_name.clone()),
            prefix: Some(args.file_name.clone()),
            ..Default::default()
        };

        // names sort after their own prefix, so the exact name comes first
        let exact = list_files(api, request, listing(args.show_versions))
            .try_take_while(|version| future::ready(Ok(version.file_name == args.file_name)));
        let versions: Vec<FileVersion> = if args.show_versions {
            exact.try_collect().await?
        } else {
            exact.take(1).try_collect().await?
        };
        debug!(file_name = %args.file_name, versions = versions.len(), "Listed file");

        let raw = json!({
            "bucketId": args.bucket_id,
            "fileName": args.file_name,
            "showVersions": args.show_versions,
            "fileVersions": project(&versions)?,
        });
        shape(&raw, &BUCKET_FILE)
    }
}

#[async_trait]
impl ResourceHandler for BucketFile {
    fn ident(&self) -> &'static str {
        "BucketFile"
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
                "file lookups are a data source",
            )),
        }
    }
}

/// Every file under a folder, optionally recursive and with history
pub struct BucketFiles;

impl BucketFiles {
    async fn data_source_read(
        &self,
        api: &dyn B2Api,
        args: FilesQuery,
    ) -> Result<Map<String, Value>> {
        let bucket = get_bucket_by_id(api, &args.bucket_id).await?;
        let prefix = folder_prefix(&args.folder_name);
        let request = ListFiles {
            bucket_id: bucket.bucket_id,
            prefix: Some(prefix).filter(|p| !p.is_empty()),
            delimiter: if args.recursive {
                None
            } else {
                Some("/".to_string())
            },
            ..Default::default()
        };

        let versions: Vec<FileVersion> = list_files(api, request, listing(args.show_versions))
            .try_collect()
            .await?;
        debug!(folder_name = %args.folder_name, entries = versions.len(), "Listed folder");

        let raw = json!({
            "bucketId": args.bucket_id,
            "folderName": args.folder_name,
            "showVersions": args.show_versions,
            "recursive": args.recursive,
            "fileVersions": project(&versions)?,
        });
        shape(&raw, &BUCKET_FILES)
    }
}

#[async_trait]
impl ResourceHandler for BucketFiles {
    fn ident(&self) -> &'static str {
        "BucketFiles"
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
                "file listings are a data source",
            )),
        }
    }
}
