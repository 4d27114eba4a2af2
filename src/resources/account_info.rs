//! Account information data source

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::b2::B2Api;
use crate::errors::Result;
use crate::shape::schemas::ACCOUNT_INFO;
use crate::shape::shape_entity;

use super::{unsupported, Operation, ResourceHandler};

/// Details of the authorized account and its key restrictions
pub struct AccountInfo;

#[async_trait]
impl ResourceHandler for AccountInfo {
    fn ident(&self) -> &'static str {
        "AccountInfo"
    }

    #[instrument(skip(self, api, _payload))]
    async fn call(
        &self,
        operation: Operation,
        api: &dyn B2Api,
        _payload: Value,
    ) -> Result<Map<String, Value>> {
        match operation {
            Operation::DataSourceRead => {
                let session = api.session()?;
                debug!(account_id = %session.account_id, "Reading account info");
                shape_entity(session, &ACCOUNT_INFO)
            }
            Operation::ResourceCreate
            | Operation::ResourceRead
            | Operation::ResourceUpdate
            | Operation::ResourceDelete => Err(unsupported(
                self.ident(),
                operation,
                "account info is a data source",
            )),
        }
    }
}
