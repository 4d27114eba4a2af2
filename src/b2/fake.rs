//! In-memory B2 API for tests
//!
//! Keeps buckets, keys, files and notification rules in a mutex-guarded
//! state and pages listings the way the real API does. Every call is
//! recorded so tests can assert on what the handlers asked for.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map};
use sha1::{Digest, Sha1};

use crate::errors::{BridgeError, Result};

use super::types::*;
use super::B2Api;

pub const ACCOUNT_ID: &str = "acc-1";

#[derive(Default)]
struct State {
    page_size: usize,
    next_id: u64,
    buckets: Vec<Bucket>,
    keys: Vec<ApplicationKey>,
    files: Vec<FileVersion>,
    rules: HashMap<String, Vec<NotificationRule>>,
    calls: Vec<&'static str>,
    updates: Vec<BucketUpdate>,
    uploads: Vec<Upload>,
    failures: HashMap<&'static str, (u16, String)>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{}", prefix, self.next_id)
    }

    fn record(&mut self, call: &'static str) -> Result<()> {
        self.calls.push(call);
        match self.failures.get(call) {
            Some((status, code)) => Err(api_error(*status, code)),
            None => Ok(()),
        }
    }
}

fn api_error(status: u16, code: &str) -> BridgeError {
    BridgeError::Api {
        status,
        code: code.to_string(),
        message: format!("fake {}", code),
    }
}

/// Fake [`B2Api`] backed by in-memory state
pub struct FakeB2Api {
    session: Option<Session>,
    state: Mutex<State>,
}

impl FakeB2Api {
    /// Not yet authorized fake
    pub fn new() -> Self {
        Self {
            session: None,
            state: Mutex::new(State {
                page_size: 1000,
                ..Default::default()
            }),
        }
    }

    /// Fake with a session already in place
    pub fn authorized() -> Self {
        let mut api = Self::new();
        api.session = Some(Self::default_session());
        api
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().unwrap().page_size = page_size;
        self
    }

    /// Session handed out by the fake
    pub fn default_session() -> Session {
        Session {
            account_id: ACCOUNT_ID.to_string(),
            authorization_token: "auth-token".to_string(),
            api_url: "https://api000.backblazeb2.com".to_string(),
            download_url: "https://f000.backblazeb2.com".to_string(),
            s3_api_url: "https://s3.us-west-000.backblazeb2.com".to_string(),
            recommended_part_size: 100_000_000,
            absolute_minimum_part_size: 5_000_000,
            allowed: Allowed {
                buckets: vec![AllowedBucket {
                    id: "b1".to_string(),
                    name: Some("my-bucket".to_string()),
                }],
                capabilities: vec!["listBuckets".to_string(), "readFiles".to_string()],
                name_prefix: None,
            },
        }
    }

    /// Plain uploaded file version
    pub fn file_version(bucket_id: &str, file_name: &str, file_id: &str) -> FileVersion {
        FileVersion {
            action: "upload".to_string(),
            bucket_id: Some(bucket_id.to_string()),
            content_md5: None,
            content_sha1: Some("da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string()),
            content_type: Some("text/plain".to_string()),
            file_id: Some(file_id.to_string()),
            file_info: Map::new(),
            file_name: file_name.to_string(),
            size: 0,
            server_side_encryption: Some(json!({"mode": null})),
            upload_timestamp: 1_700_000_000_000,
        }
    }

    /// Bucket with every optional setting left empty
    pub fn bucket(bucket_id: &str, bucket_name: &str) -> Bucket {
        Bucket {
            account_id: ACCOUNT_ID.to_string(),
            bucket_id: bucket_id.to_string(),
            bucket_name: bucket_name.to_string(),
            bucket_type: "allPrivate".to_string(),
            bucket_info: Map::new(),
            cors_rules: Vec::new(),
            default_server_side_encryption: Some(Authorized {
                is_client_authorized_to_read: true,
                value: Some(json!({"mode": "none"})),
            }),
            file_lock_configuration: Some(Authorized {
                is_client_authorized_to_read: true,
                value: Some(FileLockConfiguration {
                    is_file_lock_enabled: Some(false),
                    default_retention: Some(json!({"mode": null})),
                }),
            }),
            lifecycle_rules: Vec::new(),
            options: vec!["s3".to_string()],
            revision: 1,
        }
    }

    pub fn insert_bucket(&self, bucket: Bucket) {
        self.state.lock().unwrap().buckets.push(bucket);
    }

    pub fn insert_key(&self, key: ApplicationKey) {
        self.state.lock().unwrap().keys.push(key);
    }

    pub fn insert_file(&self, version: FileVersion) {
        self.state.lock().unwrap().files.push(version);
    }

    pub fn insert_rules(&self, bucket_id: &str, rules: Vec<NotificationRule>) {
        self.state
            .lock()
            .unwrap()
            .rules
            .insert(bucket_id.to_string(), rules);
    }

    /// Make every later `call` fail with the given B2 error code
    pub fn fail(&self, call: &'static str, status: u16, code: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(call, (status, code.to_string()));
    }

    /// Number of file listing pages fetched
    pub fn list_calls(&self) -> usize {
        self.calls_to("list_file_versions") + self.calls_to("list_file_names")
    }

    pub fn calls_to(&self, call: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub fn updates(&self) -> Vec<BucketUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn buckets(&self) -> Vec<Bucket> {
        self.state.lock().unwrap().buckets.clone()
    }

    pub fn keys(&self) -> Vec<ApplicationKey> {
        self.state.lock().unwrap().keys.clone()
    }

    pub fn rules(&self, bucket_id: &str) -> Option<Vec<NotificationRule>> {
        self.state.lock().unwrap().rules.get(bucket_id).cloned()
    }

    fn list(&self, call: &'static str, request: ListFiles, latest_only: bool) -> Result<FilePage> {
        let mut state = self.state.lock().unwrap();
        state.record(call)?;

        let prefix = request.prefix.clone().unwrap_or_default();
        let mut matching: Vec<FileVersion> = state
            .files
            .iter()
            .filter(|f| f.bucket_id.as_deref() == Some(request.bucket_id.as_str()))
            .filter(|f| f.file_name.starts_with(&prefix))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.file_name
                .cmp(&b.file_name)
                .then(b.upload_timestamp.cmp(&a.upload_timestamp))
        });

        if latest_only {
            let mut seen: Vec<String> = Vec::new();
            matching.retain(|f| {
                if seen.contains(&f.file_name) {
                    return false;
                }
                seen.push(f.file_name.clone());
                f.action != "hide"
            });
        }

        let mut view: Vec<FileVersion> = Vec::new();
        for file in matching {
            let folder = request.delimiter.as_deref().and_then(|delimiter| {
                file.file_name[prefix.len()..]
                    .find(delimiter)
                    .map(|at| file.file_name[..prefix.len() + at + delimiter.len()].to_string())
            });
            match folder {
                Some(folder) => {
                    if view.iter().any(|v| v.file_name == folder) {
                        continue;
                    }
                    view.push(FileVersion {
                        action: "folder".to_string(),
                        bucket_id: None,
                        content_md5: None,
                        content_sha1: None,
                        content_type: None,
                        file_id: None,
                        file_info: Map::new(),
                        file_name: folder,
                        size: 0,
                        server_side_encryption: None,
                        upload_timestamp: 0,
                    });
                }
                None => view.push(file),
            }
        }

        let start = match &request.start_file_name {
            Some(start_name) => view
                .iter()
                .position(|f| {
                    f.file_name.as_str() > start_name.as_str()
                        || (f.file_name == *start_name
                            && (request.start_file_id.is_none()
                                || f.file_id == request.start_file_id))
                })
                .unwrap_or(view.len()),
            None => 0,
        };

        let page_size = request
            .max_file_count
            .map(|n| n as usize)
            .unwrap_or(state.page_size)
            .min(state.page_size);
        let rest = &view[start..];
        let files: Vec<FileVersion> = rest.iter().take(page_size).cloned().collect();
        let next = rest.get(page_size);

        Ok(FilePage {
            files,
            next_file_name: next.map(|f| f.file_name.clone()),
            next_file_id: next.and_then(|f| f.file_id.clone()),
        })
    }
}

impl Default for FakeB2Api {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl B2Api for FakeB2Api {
    async fn authorize_account(&mut self, endpoint: &str, key_id: &str, key: &str) -> Result<()> {
        self.state.lock().unwrap().record("authorize_account")?;
        if key_id.is_empty() || key.is_empty() || endpoint.is_empty() {
            return Err(api_error(401, "unauthorized"));
        }
        self.session = Some(Self::default_session());
        Ok(())
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| BridgeError::invalid("account is not authorized"))
    }

    fn user_agent(&self) -> String {
        "b2-tf-bridge/test".to_string()
    }

    async fn list_buckets(&self, filter: BucketFilter) -> Result<Vec<Bucket>> {
        let mut state = self.state.lock().unwrap();
        state.record("list_buckets")?;
        Ok(state
            .buckets
            .iter()
            .filter(|b| filter.bucket_id.as_ref().map_or(true, |id| *id == b.bucket_id))
            .filter(|b| {
                filter
                    .bucket_name
                    .as_ref()
                    .map_or(true, |name| *name == b.bucket_name)
            })
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, bucket: NewBucket) -> Result<Bucket> {
        let mut state = self.state.lock().unwrap();
        state.record("create_bucket")?;
        if state.buckets.iter().any(|b| b.bucket_name == bucket.bucket_name) {
            return Err(api_error(400, "duplicate_bucket_name"));
        }

        let bucket_id = state.next_id("bucket-");
        let mut created = Self::bucket(&bucket_id, &bucket.bucket_name);
        created.bucket_type = bucket.bucket_type;
        created.bucket_info = bucket.bucket_info;
        created.cors_rules = bucket.cors_rules;
        created.lifecycle_rules = bucket.lifecycle_rules;
        created.file_lock_configuration = Some(Authorized {
            is_client_authorized_to_read: true,
            value: Some(FileLockConfiguration {
                is_file_lock_enabled: Some(bucket.file_lock_enabled),
                default_retention: Some(json!({"mode": null})),
            }),
        });
        if let Some(encryption) = bucket.default_server_side_encryption {
            created.default_server_side_encryption = Some(Authorized {
                is_client_authorized_to_read: true,
                value: Some(encryption.to_api_value()),
            });
        }
        state.buckets.push(created.clone());
        Ok(created)
    }

    async fn update_bucket(&self, update: BucketUpdate) -> Result<Bucket> {
        let mut state = self.state.lock().unwrap();
        state.record("update_bucket")?;
        state.updates.push(update.clone());

        let bucket = state
            .buckets
            .iter_mut()
            .find(|b| b.bucket_id == update.bucket_id)
            .ok_or_else(|| api_error(400, "bad_bucket_id"))?;

        if let Some(bucket_type) = update.bucket_type {
            bucket.bucket_type = bucket_type;
        }
        if let Some(bucket_info) = update.bucket_info {
            bucket.bucket_info = bucket_info;
        }
        if let Some(cors_rules) = update.cors_rules {
            bucket.cors_rules = cors_rules;
        }
        if let Some(lifecycle_rules) = update.lifecycle_rules {
            bucket.lifecycle_rules = lifecycle_rules;
        }
        if let Some(encryption) = update.default_server_side_encryption {
            bucket.default_server_side_encryption = Some(Authorized {
                is_client_authorized_to_read: true,
                value: Some(encryption.to_api_value()),
            });
        }
        if let Some(retention) = update.default_retention {
            let lock = bucket
                .file_lock_configuration
                .get_or_insert_with(Default::default);
            lock.value
                .get_or_insert_with(Default::default)
                .default_retention = Some(retention);
        }
        bucket.revision += 1;
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_bucket")?;
        let before = state.buckets.len();
        state.buckets.retain(|b| b.bucket_id != bucket_id);
        if state.buckets.len() == before {
            return Err(api_error(400, "bad_bucket_id"));
        }
        Ok(())
    }

    async fn list_keys(&self, start_application_key_id: Option<String>) -> Result<KeyPage> {
        let mut state = self.state.lock().unwrap();
        state.record("list_keys")?;
        let mut keys = state.keys.clone();
        keys.sort_by(|a, b| a.application_key_id.cmp(&b.application_key_id));

        let start = match start_application_key_id {
            Some(id) => keys
                .iter()
                .position(|k| k.application_key_id >= id)
                .unwrap_or(keys.len()),
            None => 0,
        };
        let rest = &keys[start..];
        Ok(KeyPage {
            keys: rest.iter().take(state.page_size).cloned().collect(),
            next_application_key_id: rest
                .get(state.page_size)
                .map(|k| k.application_key_id.clone()),
        })
    }

    async fn create_key(&self, key: NewKey) -> Result<ApplicationKey> {
        let mut state = self.state.lock().unwrap();
        state.record("create_key")?;
        let id = state.next_id("key-");
        let created = ApplicationKey {
            application_key_id: id.clone(),
            application_key: Some(format!("secret-{}", id)),
            key_name: key.key_name,
            capabilities: key.capabilities,
            bucket_ids: key.bucket_ids,
            name_prefix: key.name_prefix,
            expiration_timestamp: key
                .valid_duration_in_seconds
                .map(|secs| 1_700_000_000_000 + secs as i64 * 1000),
            options: vec!["s3".to_string()],
        };

        let mut stored = created.clone();
        stored.application_key = None;
        state.keys.push(stored);
        Ok(created)
    }

    async fn delete_key(&self, application_key_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_key")?;
        let before = state.keys.len();
        state
            .keys
            .retain(|k| k.application_key_id != application_key_id);
        if state.keys.len() == before {
            return Err(api_error(400, "bad_request"));
        }
        Ok(())
    }

    async fn list_file_versions(&self, request: ListFiles) -> Result<FilePage> {
        self.list("list_file_versions", request, false)
    }

    async fn list_file_names(&self, request: ListFiles) -> Result<FilePage> {
        self.list("list_file_names", request, true)
    }

    async fn get_file_info(&self, file_id: &str) -> Result<FileVersion> {
        let mut state = self.state.lock().unwrap();
        state.record("get_file_info")?;
        state
            .files
            .iter()
            .find(|f| f.file_id.as_deref() == Some(file_id))
            .cloned()
            .ok_or_else(|| api_error(404, "not_found"))
    }

    async fn delete_file_version(&self, file_name: &str, file_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_file_version")?;
        let before = state.files.len();
        state.files.retain(|f| {
            !(f.file_name == file_name && f.file_id.as_deref() == Some(file_id))
        });
        if state.files.len() == before {
            return Err(api_error(400, "file_not_present"));
        }
        Ok(())
    }

    async fn upload_file(&self, upload: Upload) -> Result<FileVersion> {
        let mut state = self.state.lock().unwrap();
        state.record("upload_file")?;

        let mut file_info = upload.file_info.clone();
        let server_side_encryption = match &upload.encryption {
            Some(setting) => {
                if let Some(key_id) = setting.key.as_ref().and_then(|k| k.key_id.clone()) {
                    file_info.insert("sse_c_key_id".to_string(), json!(key_id));
                }
                setting.to_api_value()
            }
            None => json!({"mode": null}),
        };

        let mut version = Self::file_version(&upload.bucket_id, &upload.file_name, "");
        version.file_id = Some(state.next_id("4_z"));
        version.content_sha1 = Some(hex::encode(Sha1::digest(&upload.data)));
        version.content_md5 = Some(format!("{:x}", md5::compute(&upload.data)));
        version.content_type = Some(
            upload
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        );
        version.file_info = file_info;
        version.size = upload.data.len() as u64;
        version.server_side_encryption = Some(server_side_encryption);

        state.uploads.push(upload);
        state.files.push(version.clone());
        Ok(version)
    }

    async fn get_download_authorization(
        &self,
        bucket_id: &str,
        file_name_prefix: &str,
        valid_duration_in_seconds: u64,
    ) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .record("get_download_authorization")?;
        Ok(format!(
            "token-{}-{}-{}",
            bucket_id, file_name_prefix, valid_duration_in_seconds
        ))
    }

    async fn get_notification_rules(&self, bucket_id: &str) -> Result<Vec<NotificationRule>> {
        let mut state = self.state.lock().unwrap();
        state.record("get_notification_rules")?;
        if !state.buckets.iter().any(|b| b.bucket_id == bucket_id) {
            return Err(api_error(400, "bad_bucket_id"));
        }
        Ok(state.rules.get(bucket_id).cloned().unwrap_or_default())
    }

    async fn set_notification_rules(
        &self,
        bucket_id: &str,
        rules: Vec<NotificationRule>,
    ) -> Result<Vec<NotificationRule>> {
        let mut state = self.state.lock().unwrap();
        state.record("set_notification_rules")?;
        if !state.buckets.iter().any(|b| b.bucket_id == bucket_id) {
            return Err(api_error(400, "bad_bucket_id"));
        }
        let stored: Vec<NotificationRule> = rules
            .into_iter()
            .map(|mut rule| {
                rule.is_suspended = Some(false);
                rule.suspension_reason = Some(String::new());
                rule
            })
            .collect();
        state.rules.insert(bucket_id.to_string(), stored.clone());
        Ok(stored)
    }
}
