//! GitHub Contents API Client
//!
//! Uses one repository as the backing bucket: files are read, written and
//! deleted through the contents endpoints, and every write is a commit.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, info};

use super::errors::GitHubError;
use super::types::{
    CommitEntry, Committer, ContentItem, ContentsResponse, DeleteContentRequest,
    PutContentRequest, PutContentResponse,
};
use crate::store::{ContentStream, FileDescriptor, RemoteStore, StoreError};

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Connection settings for one repository
#[derive(Debug, Clone)]
pub struct GitHubSettings {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub token: String,
    /// Branch to read and commit to; the repository default when `None`
    pub branch: Option<String>,
    pub committer: Option<Committer>,
}

/// GitHub API client scoped to a single repository
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client for making requests
    http_client: Client,
    settings: GitHubSettings,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Result<Self, GitHubError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(
            owner = %settings.owner,
            repo = %settings.repo,
            branch = ?settings.branch,
            "GitHub client ready"
        );
        Ok(Self {
            http_client,
            settings,
        })
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.owner,
            self.settings.repo
        )
    }

    /// Contents URL with every path segment percent-encoded
    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/contents/{}", self.repo_url(), encoded.join("/"))
    }

    /// Authenticated request with the standard API headers
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.request_as(method, url, JSON_MEDIA_TYPE)
    }

    fn request_as(&self, method: Method, url: &str, accept: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.token))
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Attach `ref=<branch>` to reads when a branch is configured
    fn on_branch(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.settings.branch {
            Some(branch) => request.query(&[("ref", branch.as_str())]),
            None => request,
        }
    }

    /// Turn non-success responses into a GitHubError
    async fn check(response: Response) -> Result<Response, GitHubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "0");
        let body = response.text().await.unwrap_or_default();
        Err(GitHubError::from_status(status.as_u16(), &body, rate_limited))
    }

    /// Fetch the contents endpoint for a path (file or directory)
    pub async fn get_contents(&self, path: &str) -> Result<ContentsResponse, GitHubError> {
        let url = self.contents_url(path);
        debug!(path = path, "Fetching contents from GitHub");

        let response = self.on_branch(self.request(Method::GET, &url)).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// List the entries of a directory
    pub async fn list_directory(&self, path: &str) -> Result<Vec<ContentItem>, GitHubError> {
        match self.get_contents(path).await? {
            ContentsResponse::Directory(items) => {
                debug!(path = path, count = items.len(), "Listed directory from GitHub");
                Ok(items)
            }
            ContentsResponse::Entry(item) => Err(GitHubError::NotFound(format!(
                "{} is a {}, not a directory",
                item.path, item.kind
            ))),
        }
    }

    /// Look up a single file
    pub async fn get_file(&self, path: &str) -> Result<ContentItem, GitHubError> {
        match self.get_contents(path).await? {
            ContentsResponse::Entry(item) if item.is_file() => Ok(item),
            _ => Err(GitHubError::NotFound(format!("{} is not a file", path))),
        }
    }

    /// Start a raw download; the response body is streamed by the caller
    pub async fn download(&self, locator: &str) -> Result<Response, GitHubError> {
        debug!(locator = locator, "Downloading file from GitHub");
        let response = self
            .request_as(Method::GET, locator, RAW_MEDIA_TYPE)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Create or update a file, committing `message`
    pub async fn put_file(
        &self,
        path: &str,
        data: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<ContentItem, GitHubError> {
        let url = self.contents_url(path);
        let body = PutContentRequest {
            message,
            content: base64::engine::general_purpose::STANDARD.encode(data),
            sha,
            branch: self.settings.branch.as_deref(),
            committer: self.settings.committer.as_ref(),
        };

        info!(
            file = path,
            size = data.len(),
            update = sha.is_some(),
            "Committing file to GitHub"
        );

        let response = self.request(Method::PUT, &url).json(&body).send().await?;
        let response = Self::check(response).await?;
        let put: PutContentResponse = response.json().await?;

        info!(file = path, sha = %put.content.sha, "File committed to GitHub");
        Ok(put.content)
    }

    /// Delete a file at the given blob sha
    pub async fn remove_file(&self, path: &str, sha: &str, message: &str) -> Result<(), GitHubError> {
        let url = self.contents_url(path);
        let body = DeleteContentRequest {
            message,
            sha,
            branch: self.settings.branch.as_deref(),
            committer: self.settings.committer.as_ref(),
        };

        info!(file = path, sha = sha, "Deleting file from GitHub");

        let response = self.request(Method::DELETE, &url).json(&body).send().await?;
        Self::check(response).await?;

        info!(file = path, "File deleted from GitHub");
        Ok(())
    }

    /// Date of the most recent commit touching `path`
    pub async fn latest_commit_date(&self, path: &str) -> Result<Option<DateTime<Utc>>, GitHubError> {
        let url = format!("{}/commits", self.repo_url());
        let mut request = self
            .request(Method::GET, &url)
            .query(&[("path", path), ("per_page", "1")]);
        if let Some(branch) = &self.settings.branch {
            request = request.query(&[("sha", branch.as_str())]);
        }

        let response = Self::check(request.send().await?).await?;
        let commits: Vec<CommitEntry> = response.json().await?;
        Ok(commits.first().and_then(CommitEntry::date))
    }
}

#[async_trait]
impl RemoteStore for GitHubClient {
    async fn fetch_listing(&self, prefix: &str) -> Result<Vec<FileDescriptor>, StoreError> {
        let items = self.list_directory(prefix).await?;
        Ok(items
            .iter()
            .filter(|item| item.is_file())
            .map(ContentItem::to_descriptor)
            .collect())
    }

    async fn fetch_file(&self, path: &str) -> Result<FileDescriptor, StoreError> {
        Ok(self.get_file(path).await?.to_descriptor())
    }

    async fn fetch_content(&self, locator: &str) -> Result<ContentStream, StoreError> {
        let response = self.download(locator).await?;
        let stream = response
            .bytes_stream()
            .map_err(|e| StoreError::RemoteUnavailable(e.to_string()));
        Ok(Box::pin(stream))
    }

    async fn write_file(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        revision: Option<&str>,
    ) -> Result<FileDescriptor, StoreError> {
        let item = self.put_file(path, &content, message, revision).await?;
        Ok(item.to_descriptor())
    }

    async fn delete_file(
        &self,
        path: &str,
        revision: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.remove_file(path, revision, message)
            .await
            .map_err(StoreError::from)
    }

    async fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.latest_commit_date(path).await.map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, branch: Option<&str>) -> GitHubClient {
        GitHubClient::new(GitHubSettings {
            api_url: server.uri(),
            owner: "acme".to_string(),
            repo: "cdn".to_string(),
            token: "test-token".to_string(),
            branch: branch.map(String::from),
            committer: None,
        })
        .unwrap()
    }

    fn file_json(server: &MockServer, path: &str, sha: &str, size: u64) -> serde_json::Value {
        let name = path.rsplit('/').next().unwrap();
        serde_json::json!({
            "name": name,
            "path": path,
            "sha": sha,
            "size": size,
            "url": format!("{}/repos/acme/cdn/contents/{}?ref=main", server.uri(), path),
            "download_url": format!("{}/raw/{}", server.uri(), path),
            "type": "file"
        })
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let client = GitHubClient::new(GitHubSettings {
            api_url: "https://api.github.com/".to_string(),
            owner: "acme".to_string(),
            repo: "cdn".to_string(),
            token: "t".to_string(),
            branch: None,
            committer: None,
        })
        .unwrap();
        assert_eq!(
            client.contents_url("/media/my logo.png/"),
            "https://api.github.com/repos/acme/cdn/contents/media/my%20logo.png"
        );
        assert_eq!(
            client.contents_url(""),
            "https://api.github.com/repos/acme/cdn/contents/"
        );
    }

    #[tokio::test]
    async fn test_listing_keeps_files_only() {
        let server = MockServer::start().await;
        let listing = serde_json::json!([
            file_json(&server, "media/logo.png", "sha-logo", 4),
            {
                "name": "icons",
                "path": "media/icons",
                "sha": "sha-dir",
                "size": 0,
                "url": format!("{}/repos/acme/cdn/contents/media/icons", server.uri()),
                "download_url": null,
                "type": "dir"
            }
        ]);

        Mock::given(method("GET"))
            .and(path("/repos/acme/cdn/contents/media"))
            .and(query_param("ref", "main"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server, Some("main")).fetch_listing("media").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "media/logo.png");
        assert_eq!(files[0].revision, "sha-logo");
    }

    #[tokio::test]
    async fn test_fetch_file_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/cdn/contents/missing.txt"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let err = client(&server, None).fetch_file("missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_sends_base64_and_sha() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/acme/cdn/contents/media/logo.png"))
            .and(body_partial_json(serde_json::json!({
                "message": "Upload logo.png",
                "content": "aGVsbG8=",
                "sha": "old-sha"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": file_json(&server, "media/logo.png", "new-sha", 5),
                "commit": {"sha": "commit-sha"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let desc = client(&server, None)
            .write_file(
                "media/logo.png",
                Bytes::from_static(b"hello"),
                "Upload logo.png",
                Some("old-sha"),
            )
            .await
            .unwrap();
        assert_eq!(desc.revision, "new-sha");
        assert_eq!(desc.size, 5);
    }

    #[tokio::test]
    async fn test_stale_sha_is_revision_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/cdn/contents/a.txt"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "message": "a.txt does not match stale-sha"
            })))
            .mount(&server)
            .await;

        let err = client(&server, None)
            .delete_file("a.txt", "stale-sha", "Delete a.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server, None).fetch_listing("").await.unwrap_err();
        assert!(matches!(err, StoreError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_content_streams_from_contents_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/cdn/contents/media/logo.png"))
            .and(header("Accept", JSON_MEDIA_TYPE))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(file_json(&server, "media/logo.png", "sha-logo", 7)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/cdn/contents/media/logo.png"))
            .and(query_param("ref", "main"))
            .and(header("Accept", RAW_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        // The raw.githubusercontent copy may lag behind the latest commit
        Mock::given(method("GET"))
            .and(path("/raw/media/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OLDDATA".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server, Some("main"));
        let desc = client.fetch_file("media/logo.png").await.unwrap();
        assert_eq!(desc.download_url, Some(format!("{}/raw/media/logo.png", server.uri())));

        let chunks: Vec<Bytes> = client
            .fetch_content(&desc.locator)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"PNGDATA".to_vec());
    }

    #[tokio::test]
    async fn test_last_modified_uses_latest_commit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/cdn/commits"))
            .and(query_param("path", "media/logo.png"))
            .and(query_param("per_page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "sha": "c1",
                "commit": {"committer": {"date": "2024-05-06T07:08:09Z"}}
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/cdn/commits"))
            .and(query_param("path", "never.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = client(&server, None);
        let date = client.last_modified("media/logo.png").await.unwrap().unwrap();
        assert_eq!(date.to_rfc3339(), "2024-05-06T07:08:09+00:00");
        assert_eq!(client.last_modified("never.txt").await.unwrap(), None);
    }
}
