//! B2 API abstraction layer
//!
//! Provides the interface the resource handlers use to talk to B2.
//! Authentication, transport and wire formats live behind the [`B2Api`]
//! trait; the production implementation is [`B2HttpClient`].

mod http;
pub mod types;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::config::ClientConfig;
use crate::errors::{BridgeError, Result};

pub use http::B2HttpClient;
pub use types::*;

/// Storage API trait for every call the handlers make
///
/// Implementations own the session: [`B2Api::authorize_account`] must
/// succeed before any other call.
#[async_trait]
pub trait B2Api: Send + Sync {
    /// Authorize against `endpoint` (`production`, `staging`, `dev` or a URL)
    async fn authorize_account(&mut self, endpoint: &str, key_id: &str, key: &str) -> Result<()>;

    /// Session established by [`B2Api::authorize_account`]
    fn session(&self) -> Result<&Session>;

    /// User-Agent sent with every request
    fn user_agent(&self) -> String;

    async fn list_buckets(&self, filter: BucketFilter) -> Result<Vec<Bucket>>;

    async fn create_bucket(&self, bucket: NewBucket) -> Result<Bucket>;

    async fn update_bucket(&self, update: BucketUpdate) -> Result<Bucket>;

    async fn delete_bucket(&self, bucket_id: &str) -> Result<()>;

    /// One page of keys starting at `start_application_key_id`
    async fn list_keys(&self, start_application_key_id: Option<String>) -> Result<KeyPage>;

    async fn create_key(&self, key: NewKey) -> Result<ApplicationKey>;

    async fn delete_key(&self, application_key_id: &str) -> Result<()>;

    /// One page of all file versions
    async fn list_file_versions(&self, request: ListFiles) -> Result<FilePage>;

    /// One page of latest visible versions only
    async fn list_file_names(&self, request: ListFiles) -> Result<FilePage>;

    async fn get_file_info(&self, file_id: &str) -> Result<FileVersion>;

    async fn delete_file_version(&self, file_name: &str, file_id: &str) -> Result<()>;

    async fn upload_file(&self, upload: Upload) -> Result<FileVersion>;

    /// Download authorization token for names starting with `file_name_prefix`
    async fn get_download_authorization(
        &self,
        bucket_id: &str,
        file_name_prefix: &str,
        valid_duration_in_seconds: u64,
    ) -> Result<String>;

    async fn get_notification_rules(&self, bucket_id: &str) -> Result<Vec<NotificationRule>>;

    async fn set_notification_rules(
        &self,
        bucket_id: &str,
        rules: Vec<NotificationRule>,
    ) -> Result<Vec<NotificationRule>>;
}

/// Create the production API client
pub fn create_client(config: &ClientConfig) -> Result<Box<dyn B2Api>> {
    Ok(Box::new(B2HttpClient::new(config)?))
}

/// Look a bucket up by id; an empty listing is `NotFound`
pub async fn get_bucket_by_id(api: &dyn B2Api, bucket_id: &str) -> Result<Bucket> {
    let filter = BucketFilter {
        bucket_id: Some(bucket_id.to_string()),
        bucket_name: None,
    };
    api.list_buckets(filter)
        .await?
        .into_iter()
        .find(|bucket| bucket.bucket_id == bucket_id)
        .ok_or_else(|| BridgeError::NotFound {
            what: "Bucket",
            id: bucket_id.to_string(),
        })
}

/// Look a bucket up by name; an empty listing is `NotFound`
pub async fn get_bucket_by_name(api: &dyn B2Api, bucket_name: &str) -> Result<Bucket> {
    let filter = BucketFilter {
        bucket_id: None,
        bucket_name: Some(bucket_name.to_string()),
    };
    api.list_buckets(filter)
        .await?
        .into_iter()
        .find(|bucket| bucket.bucket_name == bucket_name)
        .ok_or_else(|| BridgeError::NotFound {
            what: "Bucket",
            id: bucket_name.to_string(),
        })
}

/// Which listing call backs a file stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// Every version of every file
    AllVersions,
    /// Latest visible version of every file
    LatestOnly,
}

/// Lazily paginated file listing
///
/// A page is only fetched once the consumer polls past the previous one,
/// so `take(1)` never touches the second page.
pub fn list_files(
    api: &dyn B2Api,
    request: ListFiles,
    listing: Listing,
) -> BoxStream<'_, Result<FileVersion>> {
    stream::try_unfold(Some(request), move |next| async move {
        let request = match next {
            Some(request) => request,
            None => return Ok::<_, BridgeError>(None),
        };
        let page = match listing {
            Listing::AllVersions => api.list_file_versions(request.clone()).await?,
            Listing::LatestOnly => api.list_file_names(request.clone()).await?,
        };
        let following = page.next_file_name.clone().map(|name| ListFiles {
            start_file_name: Some(name),
            start_file_id: page.next_file_id.clone(),
            ..request
        });
        Ok::<_, BridgeError>(Some((page.files, following)))
    })
    .map_ok(|files| stream::iter(files.into_iter().map(Ok::<_, BridgeError>)))
    .try_flatten()
    .boxed()
}

/// Percent-encode a file name the way B2 expects, keeping `/`
pub fn b2_url_encode(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Public download URL of a file
pub fn download_url_for(session: &Session, bucket_name: &str, file_name: &str) -> String {
    format!(
        "{}/file/{}/{}",
        session.download_url.trim_end_matches('/'),
        bucket_name,
        b2_url_encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::fake::FakeB2Api;
    use super::*;

    fn version(name: &str, id: &str) -> FileVersion {
        FakeB2Api::file_version("b1", name, id)
    }

    #[test]
    fn test_b2_url_encode_keeps_slashes() {
        assert_eq!(b2_url_encode("dir/a b.txt"), "dir/a%20b.txt");
        assert_eq!(b2_url_encode("plain"), "plain");
        assert_eq!(b2_url_encode("ünï/x"), "%C3%BCn%C3%AF/x");
    }

    #[test]
    fn test_download_url() {
        let session = FakeB2Api::default_session();
        assert_eq!(
            download_url_for(&session, "my-bucket", "docs/read me.txt"),
            "https://f000.backblazeb2.com/file/my-bucket/docs/read%20me.txt"
        );
    }

    #[tokio::test]
    async fn test_list_files_follows_pages() {
        let api = FakeB2Api::authorized().with_page_size(2);
        for i in 0..5 {
            api.insert_file(version(&format!("f{}", i), &format!("id{}", i)));
        }

        let request = ListFiles {
            bucket_id: "b1".to_string(),
            ..Default::default()
        };
        let files: Vec<FileVersion> = list_files(&api, request, Listing::AllVersions)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(files.len(), 5);
        assert_eq!(api.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_list_files_is_lazy() {
        let api = FakeB2Api::authorized().with_page_size(1);
        for i in 0..4 {
            api.insert_file(version(&format!("f{}", i), &format!("id{}", i)));
        }

        let request = ListFiles {
            bucket_id: "b1".to_string(),
            ..Default::default()
        };
        let first: Vec<FileVersion> = list_files(&api, request, Listing::AllVersions)
            .take(1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_bucket_lookup_not_found() {
        let api = FakeB2Api::authorized();
        let err = get_bucket_by_id(&api, "missing").await.unwrap_err();
        assert!(err.is_not_found());
        let err = get_bucket_by_name(&api, "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
