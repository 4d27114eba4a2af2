//! B2 native API client over HTTP
//!
//! Talks to the B2 native API (v3) with reqwest:
//! - `b2_authorize_account` with HTTP basic auth against the realm URL
//! - every other call is a JSON POST to `{apiUrl}/b2api/v3/{call}`
//!   carrying the session's authorization token
//!
//! No retries happen here; any failure is returned to the caller as-is.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use tracing::{debug, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::errors::{BridgeError, Result};

use super::types::*;
use super::{b2_url_encode, B2Api};

const API_VERSION: &str = "b2api/v3";
const DEFAULT_CONTENT_TYPE: &str = "b2/x-auto";
const MAX_KEY_COUNT: u32 = 1000;
const SSE_C_KEY_ID_FILE_INFO: &str = "sse_c_key_id";

/// Resolve a named realm or a literal URL to the authorization base URL
fn realm_url(endpoint: &str) -> Result<Url> {
    let url = match endpoint {
        "" | "production" => "https://api.backblazeb2.com",
        "staging" => "https://api.backblaze.net",
        "dev" => "http://api.backblazeb2.xyz:8180",
        other if other.starts_with("http://") || other.starts_with("https://") => other,
        other => {
            return Err(BridgeError::invalid(format!(
                "Unknown provider endpoint: {}",
                other
            )))
        }
    };
    Ok(Url::parse(url)?)
}

fn call_url(base: &str, call: &str) -> Result<Url> {
    let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
    Ok(base.join(&format!("{}/{}", API_VERSION, call))?)
}

/// Error body returned by B2
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    account_id: String,
    authorization_token: String,
    api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInfo {
    storage_api: StorageApi,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageApi {
    api_url: String,
    download_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    s3_api_url: String,
    #[serde(default)]
    recommended_part_size: u64,
    #[serde(default)]
    absolute_minimum_part_size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    allowed: Allowed,
}

impl From<AuthorizeResponse> for Session {
    fn from(response: AuthorizeResponse) -> Self {
        let storage = response.api_info.storage_api;
        Session {
            account_id: response.account_id,
            authorization_token: response.authorization_token,
            api_url: storage.api_url,
            download_url: storage.download_url,
            s3_api_url: storage.s3_api_url,
            recommended_part_size: storage.recommended_part_size,
            absolute_minimum_part_size: storage.absolute_minimum_part_size,
            allowed: storage.allowed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default, deserialize_with = "null_as_default")]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadAuthorization {
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationRules {
    #[serde(default, deserialize_with = "null_as_default")]
    event_notification_rules: Vec<NotificationRule>,
}

/// B2 HTTP client
pub struct B2HttpClient {
    http: Client,
    user_agent: String,
    session: Option<Session>,
}

impl B2HttpClient {
    /// Create a new, not yet authorized client
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut user_agent = format!("b2-tf-bridge/{}", env!("CARGO_PKG_VERSION"));
        if let Some(append) = &config.user_agent_append {
            user_agent.push(' ');
            user_agent.push_str(append);
        }

        let http = Client::builder()
            .user_agent(user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            user_agent,
            session: None,
        })
    }

    /// Send a request and decode the JSON answer, mapping B2 error bodies
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            return Ok(serde_json::from_str(&text)?);
        }

        let text = response.text().await.unwrap_or_default();
        let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or(ApiErrorBody {
            code: status
                .canonical_reason()
                .unwrap_or("unknown")
                .to_lowercase()
                .replace(' ', "_"),
            message: text,
        });
        Err(BridgeError::Api {
            status: status.as_u16(),
            code: body.code,
            message: body.message,
        })
    }

    /// POST a JSON body to a B2 API call
    async fn call<T: DeserializeOwned>(&self, name: &str, body: Value) -> Result<T> {
        let session = self.session()?;
        let url = call_url(&session.api_url, name)?;
        debug!(call = name, "B2 API call");
        self.send(
            self.http
                .post(url)
                .header("Authorization", session.authorization_token.as_str())
                .json(&body),
        )
        .await
    }

    fn account_id(&self) -> Result<&str> {
        Ok(self.session()?.account_id.as_str())
    }
}

#[async_trait]
impl B2Api for B2HttpClient {
    #[instrument(skip(self, key))]
    async fn authorize_account(&mut self, endpoint: &str, key_id: &str, key: &str) -> Result<()> {
        let url = realm_url(endpoint)?.join(&format!("{}/b2_authorize_account", API_VERSION))?;
        let response: AuthorizeResponse = self
            .send(self.http.get(url).basic_auth(key_id, Some(key)))
            .await?;
        debug!(account_id = %response.account_id, "Account authorized");
        self.session = Some(response.into());
        Ok(())
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| BridgeError::invalid("account is not authorized"))
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    async fn list_buckets(&self, filter: BucketFilter) -> Result<Vec<Bucket>> {
        let mut body = serde_json::to_value(&filter)?;
        body["accountId"] = json!(self.account_id()?);
        let list: BucketList = self.call("b2_list_buckets", body).await?;
        Ok(list.buckets)
    }

    async fn create_bucket(&self, bucket: NewBucket) -> Result<Bucket> {
        let body = bucket.to_api_body(self.account_id()?);
        self.call("b2_create_bucket", body).await
    }

    async fn update_bucket(&self, update: BucketUpdate) -> Result<Bucket> {
        let body = update.to_api_body(self.account_id()?);
        self.call("b2_update_bucket", body).await
    }

    async fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        let body = json!({"accountId": self.account_id()?, "bucketId": bucket_id});
        let _: Value = self.call("b2_delete_bucket", body).await?;
        Ok(())
    }

    async fn list_keys(&self, start_application_key_id: Option<String>) -> Result<KeyPage> {
        let mut body = json!({"accountId": self.account_id()?, "maxKeyCount": MAX_KEY_COUNT});
        if let Some(start) = start_application_key_id {
            body["startApplicationKeyId"] = json!(start);
        }
        self.call("b2_list_keys", body).await
    }

    async fn create_key(&self, key: NewKey) -> Result<ApplicationKey> {
        let mut body = serde_json::to_value(&key)?;
        body["accountId"] = json!(self.account_id()?);
        self.call("b2_create_key", body).await
    }

    async fn delete_key(&self, application_key_id: &str) -> Result<()> {
        let body = json!({"applicationKeyId": application_key_id});
        let _: Value = self.call("b2_delete_key", body).await?;
        Ok(())
    }

    async fn list_file_versions(&self, request: ListFiles) -> Result<FilePage> {
        self.call("b2_list_file_versions", serde_json::to_value(&request)?)
            .await
    }

    async fn list_file_names(&self, request: ListFiles) -> Result<FilePage> {
        let mut body = serde_json::to_value(&request)?;
        if let Some(map) = body.as_object_mut() {
            // b2_list_file_names has no startFileId
            map.remove("startFileId");
        }
        self.call("b2_list_file_names", body).await
    }

    async fn get_file_info(&self, file_id: &str) -> Result<FileVersion> {
        self.call("b2_get_file_info", json!({"fileId": file_id}))
            .await
    }

    async fn delete_file_version(&self, file_name: &str, file_id: &str) -> Result<()> {
        let body = json!({"fileName": file_name, "fileId": file_id});
        let _: Value = self.call("b2_delete_file_version", body).await?;
        Ok(())
    }

    #[instrument(
        skip(self, upload),
        fields(
            bucket_id = %upload.bucket_id,
            file_name = %upload.file_name,
            size = upload.data.len()
        )
    )]
    async fn upload_file(&self, upload: Upload) -> Result<FileVersion> {
        let target: UploadTarget = self
            .call("b2_get_upload_url", json!({"bucketId": upload.bucket_id}))
            .await?;

        let mut hasher = Sha1::new();
        hasher.update(&upload.data);
        let content_sha1 = hex::encode(hasher.finalize());

        let mut request = self
            .http
            .post(target.upload_url.as_str())
            .header("Authorization", target.authorization_token.as_str())
            .header("X-Bz-File-Name", b2_url_encode(&upload.file_name))
            .header(
                "Content-Type",
                upload
                    .content_type
                    .as_deref()
                    .unwrap_or(DEFAULT_CONTENT_TYPE),
            )
            .header("X-Bz-Content-Sha1", content_sha1);

        let mut file_info = upload.file_info.clone();
        if let Some(encryption) = &upload.encryption {
            match encryption.mode {
                EncryptionMode::None => {}
                EncryptionMode::SseB2 => {
                    let algorithm = encryption.algorithm.unwrap_or(EncryptionAlgorithm::Aes256);
                    request = request.header("X-Bz-Server-Side-Encryption", algorithm.as_str());
                }
                EncryptionMode::SseC => {
                    let key = encryption.key.as_ref().ok_or_else(|| {
                        BridgeError::invalid("SSE-C encryption requires a customer key")
                    })?;
                    let algorithm = encryption.algorithm.unwrap_or(EncryptionAlgorithm::Aes256);
                    request = request
                        .header(
                            "X-Bz-Server-Side-Encryption-Customer-Algorithm",
                            algorithm.as_str(),
                        )
                        .header(
                            "X-Bz-Server-Side-Encryption-Customer-Key",
                            STANDARD.encode(&key.secret),
                        )
                        .header(
                            "X-Bz-Server-Side-Encryption-Customer-Key-Md5",
                            STANDARD.encode(md5::compute(&key.secret).0),
                        );
                    if let Some(key_id) = &key.key_id {
                        file_info.insert(SSE_C_KEY_ID_FILE_INFO.to_string(), json!(key_id));
                    }
                }
            }
        }

        for (name, value) in &file_info {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            request = request.header(
                format!("X-Bz-Info-{}", name),
                urlencoding::encode(&value).into_owned(),
            );
        }

        self.send(request.body(upload.data)).await
    }

    async fn get_download_authorization(
        &self,
        bucket_id: &str,
        file_name_prefix: &str,
        valid_duration_in_seconds: u64,
    ) -> Result<String> {
        let body = json!({
            "bucketId": bucket_id,
            "fileNamePrefix": file_name_prefix,
            "validDurationInSeconds": valid_duration_in_seconds,
        });
        let authorization: DownloadAuthorization =
            self.call("b2_get_download_authorization", body).await?;
        Ok(authorization.authorization_token)
    }

    async fn get_notification_rules(&self, bucket_id: &str) -> Result<Vec<NotificationRule>> {
        let rules: NotificationRules = self
            .call(
                "b2_get_bucket_notification_rules",
                json!({"bucketId": bucket_id}),
            )
            .await?;
        Ok(rules.event_notification_rules)
    }

    async fn set_notification_rules(
        &self,
        bucket_id: &str,
        rules: Vec<NotificationRule>,
    ) -> Result<Vec<NotificationRule>> {
        let body = json!({"bucketId": bucket_id, "eventNotificationRules": rules});
        let rules: NotificationRules = self
            .call("b2_set_bucket_notification_rules", body)
            .await?;
        Ok(rules.event_notification_rules)
    }
}
