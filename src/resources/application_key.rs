//! Application key resource and data source

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::b2::{ApplicationKey, B2Api, NewKey};
use crate::errors::{BridgeError, Result};
use crate::shape::schemas::APPLICATION_KEY;
use crate::shape::shape_entity;

use super::{non_empty, null_as_default, parse, unsupported, Operation, ResourceHandler};

#[derive(Debug, Deserialize)]
struct ByName {
    #[serde(alias = "keyName")]
    key_name: String,
}

#[derive(Debug, Deserialize)]
struct ById {
    #[serde(alias = "applicationKeyId")]
    application_key_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateKey {
    #[serde(alias = "keyName")]
    key_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    capabilities: Vec<String>,
    #[serde(default, alias = "bucketId")]
    bucket_id: Option<String>,
    #[serde(default, alias = "bucketIds", deserialize_with = "null_as_default")]
    bucket_ids: Vec<String>,
    #[serde(default, alias = "namePrefix")]
    name_prefix: Option<String>,
    #[serde(default, alias = "validDurationInSeconds")]
    valid_duration_in_seconds: Option<u64>,
}

impl CreateKey {
    fn into_new_key(self) -> NewKey {
        let mut bucket_ids: Vec<String> = self
            .bucket_ids
            .into_iter()
            .filter(|id| !id.is_empty())
            .collect();
        if let Some(legacy) = non_empty(self.bucket_id) {
            if !bucket_ids.contains(&legacy) {
                bucket_ids.push(legacy);
            }
        }

        NewKey {
            key_name: self.key_name,
            capabilities: self.capabilities,
            bucket_ids: if bucket_ids.is_empty() {
                None
            } else {
                Some(bucket_ids)
            },
            name_prefix: non_empty(self.name_prefix),
            valid_duration_in_seconds: self.valid_duration_in_seconds.filter(|d| *d > 0),
        }
    }
}

/// Walk every page of keys until `matches` accepts one
async fn find_key<F>(api: &dyn B2Api, matches: F) -> Result<Option<ApplicationKey>>
where
    F: Fn(&ApplicationKey) -> bool + Send,
{
    let mut next_id = None;
    loop {
        let page = api.list_keys(next_id).await?;
        if let Some(key) = page.keys.into_iter().find(|key| matches(key)) {
            return Ok(Some(key));
        }
        next_id = page.next_application_key_id;
        if next_id.is_none() {
            return Ok(None);
        }
    }
}

/// Application keys
///
/// Keys cannot be changed after creation; every change recreates them.
pub struct ApplicationKeyResource;

impl ApplicationKeyResource {
    async fn data_source_read(&self, api: &dyn B2Api, args: ByName) -> Result<Map<String, Value>> {
        let found = find_key(api, |key| key.key_name == args.key_name).await?;
        let key = found.ok_or_else(|| BridgeError::NotFound {
            what: "Application Key",
            id: args.key_name.clone(),
        })?;
        shape_entity(&key, &APPLICATION_KEY)
    }

    async fn resource_create(
        &self,
        api: &dyn B2Api,
        args: CreateKey,
    ) -> Result<Map<String, Value>> {
        let new_key = args.into_new_key();
        info!(key_name = %new_key.key_name, "Creating application key");
        let key = api.create_key(new_key).await?;
        shape_entity(&key, &APPLICATION_KEY)
    }

    async fn resource_read(&self, api: &dyn B2Api, args: ById) -> Result<Map<String, Value>> {
        match find_key(api, |key| key.application_key_id == args.application_key_id).await? {
            Some(key) => shape_entity(&key, &APPLICATION_KEY),
            None => {
                debug!(application_key_id = %args.application_key_id, "Application key is gone");
                Ok(Map::new())
            }
        }
    }

    async fn resource_delete(&self, api: &dyn B2Api, args: ById) -> Result<Map<String, Value>> {
        info!(application_key_id = %args.application_key_id, "Deleting application key");
        api.delete_key(&args.application_key_id).await?;
        Ok(Map::new())
    }
}

#[async_trait]
impl ResourceHandler for ApplicationKeyResource {
    fn ident(&self) -> &'static str {
        "ApplicationKey"
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
            Operation::ResourceUpdate => Err(unsupported(
                self.ident(),
                operation,
                "every change requires recreation",
            )),
            Operation::ResourceDelete => self.resource_delete(api, parse(payload)?).await,
        }
    }
}
