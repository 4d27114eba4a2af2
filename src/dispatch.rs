//! Request dispatcher
//!
//! Runs one request through three stages:
//! - Parse: resolve the resource kind and operation tokens, decode the
//!   JSON payload line and fingerprint it
//! - Authorize: authorize the account with the credentials in the payload
//! - Dispatch: run the handler and wrap its result in the envelope
//!
//! The envelope is the handler result with snake_case top-level keys plus
//! `_sha1` (SHA-1 of the input line) and `_ua` (the client User-Agent).

use serde::Deserialize;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use tracing::{debug, info, instrument};

use crate::b2::B2Api;
use crate::errors::{BridgeError, Result};
use crate::keys::{change_keys, to_snake};
use crate::resources::{Operation, Registry};

const DEFAULT_ENDPOINT: &str = "production";

/// Provider credentials carried by every payload
#[derive(Default, Deserialize)]
struct Credentials {
    #[serde(default)]
    provider_application_key_id: Option<String>,
    #[serde(default)]
    provider_application_key: Option<String>,
    #[serde(default)]
    provider_endpoint: Option<String>,
}

/// Decoded input line
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub payload: Value,
    /// Lowercase hex SHA-1 of the trimmed input line
    pub sha1: String,
}

/// Lowercase hex SHA-1 of `data`
pub fn fingerprint(data: &str) -> String {
    hex::encode(Sha1::digest(data.as_bytes()))
}

/// Decode one input line; the payload must be a JSON object
pub fn parse_input(line: &str) -> Result<Request> {
    let line = line.trim();
    let payload: Value = serde_json::from_str(line)
        .map_err(|e| BridgeError::invalid(format!("input is not valid JSON: {}", e)))?;
    if !payload.is_object() {
        return Err(BridgeError::invalid("input must be a JSON object"));
    }
    Ok(Request {
        payload,
        sha1: fingerprint(line),
    })
}

/// Serialize a handler result into the output envelope
pub fn envelope(result: Map<String, Value>, sha1: String, user_agent: String) -> Result<String> {
    let mut output = change_keys(result, to_snake);
    output.insert("_sha1".to_string(), Value::String(sha1));
    output.insert("_ua".to_string(), Value::String(user_agent));
    Ok(serde_json::to_string(&output)?)
}

/// Routes one request to its resource handler
pub struct Dispatcher {
    registry: Registry,
    api: Box<dyn B2Api>,
}

impl Dispatcher {
    pub fn new(api: Box<dyn B2Api>) -> Self {
        Self {
            registry: Registry::new(),
            api,
        }
    }

    /// Run one request and return the serialized envelope
    #[instrument(skip(self, input))]
    pub async fn run(
        &mut self,
        resource_kind: &str,
        operation: &str,
        input: &str,
    ) -> Result<String> {
        // Parse
        let kind = self.registry.get(resource_kind)?.name();
        let operation: Operation = operation.parse()?;
        let request = parse_input(input)?;
        debug!(sha1 = %request.sha1, "Request parsed");

        // Authorize
        self.authorize(&request.payload).await?;

        // Dispatch
        info!(kind = %kind, operation = %operation, "Dispatching request");
        let handler = self.registry.get(&kind)?;
        let result = handler
            .call(operation, self.api.as_ref(), request.payload)
            .await?;
        envelope(result, request.sha1, self.api.user_agent())
    }

    async fn authorize(&mut self, payload: &Value) -> Result<()> {
        let credentials = Credentials::deserialize(payload)
            .map_err(|e| BridgeError::invalid(format!("invalid provider credentials: {}", e)))?;
        let key_id = credentials
            .provider_application_key_id
            .filter(|s| !s.is_empty());
        let key = credentials.provider_application_key.filter(|s| !s.is_empty());
        let (key_id, key) = match (key_id, key) {
            (Some(key_id), Some(key)) => (key_id, key),
            _ => {
                return Err(BridgeError::invalid(
                    "B2 Application Key and Application Key ID must be provided",
                ))
            }
        };
        let endpoint = credentials
            .provider_endpoint
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        debug!(endpoint = %endpoint, key_id = %key_id, "Authorizing account");
        self.api.authorize_account(&endpoint, &key_id, &key).await
    }
}
