//! Resource handlers
//!
//! One handler per resource kind. Every handler answers the five
//! CRUD-shaped operations:
//! - `data_source_read`
//! - `resource_create`
//! - `resource_read`
//! - `resource_update`
//! - `resource_delete`
//!
//! Operations a resource cannot perform are rejected with
//! [`BridgeError::Unsupported`].

mod account_info;
mod application_key;
mod bucket;
mod encryption;
mod file_version;
mod files;
mod notification_rules;
mod signed_url;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub(crate) use crate::b2::types::null_as_default;
use crate::b2::B2Api;
use crate::errors::{BridgeError, Result};
use crate::keys::to_snake;

pub use account_info::AccountInfo;
pub use application_key::ApplicationKeyResource;
pub use bucket::BucketResource;
pub use file_version::BucketFileVersion;
pub use files::{BucketFile, BucketFiles};
pub use notification_rules::BucketNotificationRules;
pub use signed_url::BucketFileSignedUrl;

/// CRUD-shaped operation requested by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    DataSourceRead,
    ResourceCreate,
    ResourceRead,
    ResourceUpdate,
    ResourceDelete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::DataSourceRead,
        Operation::ResourceCreate,
        Operation::ResourceRead,
        Operation::ResourceUpdate,
        Operation::ResourceDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DataSourceRead => "data_source_read",
            Operation::ResourceCreate => "resource_create",
            Operation::ResourceRead => "resource_read",
            Operation::ResourceUpdate => "resource_update",
            Operation::ResourceDelete => "resource_delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = BridgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
                BridgeError::invalid(format!(
                    "Unknown operation {}, expected one of: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// A resource kind the provider can manage
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// PascalCase identifier of the resource kind
    fn ident(&self) -> &'static str;

    /// Resource-kind token used on the command line
    fn name(&self) -> String {
        to_snake(self.ident())
    }

    /// Run `operation` with the decoded request payload
    async fn call(
        &self,
        operation: Operation,
        api: &dyn B2Api,
        payload: Value,
    ) -> Result<Map<String, Value>>;
}

/// Table of resource handlers keyed by resource-kind token
pub struct Registry {
    handlers: BTreeMap<String, Box<dyn ResourceHandler>>,
}

impl Registry {
    /// Registry with every resource kind the bridge supports
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn ResourceHandler>> = vec![
            Box::new(AccountInfo),
            Box::new(ApplicationKeyResource),
            Box::new(BucketResource),
            Box::new(BucketFile),
            Box::new(BucketFileSignedUrl),
            Box::new(BucketFileVersion),
            Box::new(BucketFiles),
            Box::new(BucketNotificationRules),
        ];
        Self {
            handlers: handlers
                .into_iter()
                .map(|handler| (handler.name(), handler))
                .collect(),
        }
    }

    /// Resolve a resource-kind token
    pub fn get(&self, kind: &str) -> Result<&dyn ResourceHandler> {
        self.handlers
            .get(kind)
            .map(|handler| handler.as_ref())
            .ok_or_else(|| {
                BridgeError::invalid(format!(
                    "Unknown resource kind {}, expected one of: {}",
                    kind,
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a request payload into a handler's argument struct
pub(crate) fn parse<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| BridgeError::invalid(format!("invalid payload: {}", e)))
}

/// Rejection for an operation a handler does not implement
pub(crate) fn unsupported(
    kind: &'static str,
    operation: Operation,
    reason: &'static str,
) -> BridgeError {
    BridgeError::Unsupported {
        kind,
        operation: operation.as_str(),
        reason,
    }
}

/// Empty strings mean "not set" in provider payloads
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Whether the error means the bucket is gone
pub(crate) fn is_missing_bucket(err: &BridgeError) -> bool {
    err.is_not_found() || err.api_code() == Some("bad_bucket_id")
}
