use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::GitHubError;

const GITHUB_API_BASE: &str = "https://api.github.com";
const MAX_RETRIES: usize = 3;
const RETRY_DELAYS_SECS: [u64; 3] = [1, 3, 7];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Sleep through a rate-limit window only when the reset is this close.
const RATE_LIMIT_MAX_WAIT_SECS: u64 = 300;
const API_USER_AGENT: &str = concat!("sift-rss-fetcher/", env!("CARGO_PKG_VERSION"));

/// One persisted conditional-GET entry: entity tag, cached body, and the
/// time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub etag: String,
    pub data: Value,
    pub updated_at: u64,
}

/// Directory of small JSON files keyed by request cache key. Writes to
/// different keys are independent files, so concurrent fetchers stay safe.
#[derive(Debug, Clone)]
pub struct EtagCache {
    dir: PathBuf,
}

impl EtagCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Cache write failures are logged, never fatal.
    pub fn store(&self, key: &str, etag: &str, data: &Value) {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let entry = CacheEntry {
            etag: etag.to_string(),
            data: data.clone(),
            updated_at,
        };
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            error!(dir = %self.dir.display(), error = %e, "failed to create cache directory");
            return;
        }
        let path = self.entry_path(key);
        match serde_json::to_string_pretty(&entry) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    error!(path = %path.display(), error = %e, "failed to write cache entry");
                } else {
                    debug!(key, "saved etag cache entry");
                }
            }
            Err(e) => error!(error = %e, "failed to serialize cache entry"),
        }
    }
}

enum Outcome {
    NotModified,
    Fresh(reqwest::Response),
}

/// Shared GitHub HTTP client: bearer auth when `GITHUB_TOKEN` is set,
/// conditional requests with entity tags, and retry with exponential
/// backoff.
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    cache: EtagCache,
}

impl GitHubClient {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, GitHubError> {
        let token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("no GITHUB_TOKEN set — using unauthenticated requests (rate limit: 60/hr)");
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: GITHUB_API_BASE.to_string(),
            token,
            cache: EtagCache::new(cache_dir),
        })
    }

    /// Point the client at a different API host (used by tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn build_request(&self, url: &str, etag: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .get(url)
            .header(USER_AGENT, API_USER_AGENT)
            .header(ACCEPT, "application/vnd.github.v3+json");
        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        request
    }

    async fn request_with_retry(&self, url: &str, etag: Option<&str>) -> Result<Outcome, GitHubError> {
        for attempt in 0..MAX_RETRIES {
            debug!(url, attempt = attempt + 1, "github request");
            match self.build_request(url, etag).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::NOT_MODIFIED {
                        return Ok(Outcome::NotModified);
                    }

                    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                        if let Some(wait) = rate_limit_wait(&response)
                            && wait < RATE_LIMIT_MAX_WAIT_SECS
                        {
                            warn!(wait, "rate limit exceeded, sleeping until reset");
                            tokio::time::sleep(Duration::from_secs(wait + 1)).await;
                            continue;
                        }
                        return Err(GitHubError::RateLimit {
                            status: status.as_u16(),
                        });
                    }

                    if status.is_server_error() {
                        if attempt < MAX_RETRIES - 1 {
                            let delay = RETRY_DELAYS_SECS[attempt];
                            warn!(status = status.as_u16(), delay, "server error, retrying");
                            tokio::time::sleep(Duration::from_secs(delay)).await;
                            continue;
                        }
                        return Err(response.error_for_status().unwrap_err().into());
                    }

                    // Success, or a client error worth surfacing as-is
                    let response = response.error_for_status()?;
                    return Ok(Outcome::Fresh(response));
                }
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        let delay = RETRY_DELAYS_SECS[attempt];
                        warn!(error = %e, delay, "request failed, retrying");
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    } else {
                        return Err(e.into());
                    }
                }
            }
        }
        Err(GitHubError::Api(format!(
            "request failed after {MAX_RETRIES} attempts"
        )))
    }

    /// List a repository folder via the contents API, served from the
    /// ETag cache on 304.
    pub async fn list_folder_contents(
        &self,
        owner: &str,
        repo: &str,
        folder_path: &str,
        git_ref: &str,
    ) -> Result<Vec<Value>, GitHubError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/contents/{folder_path}?ref={git_ref}",
            self.api_base
        );
        let cache_key = format!("{owner}_{repo}_{}_{git_ref}", folder_path.replace('/', "_"));

        let cached = self.cache.load(&cache_key);
        let etag = cached.as_ref().map(|entry| entry.etag.as_str());

        let response = match self.request_with_retry(&url, etag).await? {
            Outcome::NotModified => {
                if let Some(entry) = cached
                    && let Some(items) = entry.data.as_array()
                {
                    info!(owner, repo, folder_path, "folder contents not modified (304), using cache");
                    return Ok(items.clone());
                }
                warn!("304 but no cached body — refetching without conditional header");
                match self.request_with_retry(&url, None).await? {
                    Outcome::Fresh(response) => response,
                    Outcome::NotModified => {
                        return Err(GitHubError::Api(
                            "server returned 304 to an unconditional request".to_string(),
                        ));
                    }
                }
            }
            Outcome::Fresh(response) => response,
        };

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data: Value = response.json().await?;

        let Some(items) = data.as_array() else {
            return Err(GitHubError::Api(
                "expected folder contents (array), got a single object".to_string(),
            ));
        };

        if let Some(ref etag) = etag {
            self.cache.store(&cache_key, etag, &data);
        }

        info!(count = items.len(), owner, repo, folder_path, "fetched folder contents");
        Ok(items.clone())
    }

    /// Download raw file content. No ETag caching on this endpoint.
    pub async fn download_file_content(&self, download_url: &str) -> Result<String, GitHubError> {
        match self.request_with_retry(download_url, None).await? {
            Outcome::Fresh(response) => {
                let content = response.text().await?;
                info!(bytes = content.len(), url = download_url, "downloaded file content");
                Ok(content)
            }
            Outcome::NotModified => Err(GitHubError::Api(
                "server returned 304 to an unconditional request".to_string(),
            )),
        }
    }

    /// Uncached JSON GET against an absolute URL (e.g. the readme endpoint).
    pub async fn get_json(&self, url: &str) -> Result<Value, GitHubError> {
        match self.request_with_retry(url, None).await? {
            Outcome::Fresh(response) => Ok(response.json().await?),
            Outcome::NotModified => Err(GitHubError::Api(
                "server returned 304 to an unconditional request".to_string(),
            )),
        }
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }
}

fn rate_limit_wait(response: &reqwest::Response) -> Option<u64> {
    let reset: u64 = response
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let wait = reset.saturating_sub(now);
    (wait > 0).then_some(wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, cache_dir: &std::path::Path) -> GitHubClient {
        GitHubClient::new(cache_dir)
            .unwrap()
            .with_api_base(server.uri())
    }

    #[tokio::test]
    async fn folder_listing_persists_etag_and_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let body = json!([{"type": "file", "name": "2025-12-01.md", "download_url": "https://raw.example/x.md"}]);
        Mock::given(method("GET"))
            .and(path("/repos/acme/news/contents/letters"))
            .and(query_param("ref", "main"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"abc123\"")
                    .set_body_json(body.clone()),
            )
            .mount(&server)
            .await;

        let client = client(&server, dir.path());
        let items = client
            .list_folder_contents("acme", "news", "letters", "main")
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        let cache = EtagCache::new(dir.path());
        let entry = cache.load("acme_news_letters_main").unwrap();
        assert_eq!(entry.etag, "\"abc123\"");
        assert_eq!(entry.data, body);
        assert!(entry.updated_at > 0);
    }

    #[tokio::test]
    async fn not_modified_serves_cached_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let cached = json!([{"type": "file", "name": "cached.md", "download_url": "https://raw.example/c.md"}]);
        EtagCache::new(dir.path()).store("acme_news_letters_main", "\"abc123\"", &cached);

        Mock::given(method("GET"))
            .and(path("/repos/acme/news/contents/letters"))
            .and(header("if-none-match", "\"abc123\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = client(&server, dir.path());
        let items = client
            .list_folder_contents("acme", "news", "letters", "main")
            .await
            .unwrap();
        assert_eq!(items[0]["name"], "cached.md");
    }

    #[tokio::test]
    async fn single_file_response_is_rejected() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/repos/acme/news/contents/letters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "file"})))
            .mount(&server)
            .await;

        let client = client(&server, dir.path());
        let err = client
            .list_folder_contents("acme", "news", "letters", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::Api(_)));
    }

    #[tokio::test]
    async fn distant_rate_limit_reset_fails_fast() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let far_reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 7200;
        Mock::given(method("GET"))
            .and(path("/repos/acme/news/contents/letters"))
            .respond_with(
                ResponseTemplate::new(403).insert_header("x-ratelimit-reset", far_reset.to_string()),
            )
            .mount(&server)
            .await;

        let client = client(&server, dir.path());
        let err = client
            .list_folder_contents("acme", "news", "letters", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::RateLimit { status: 403 }));
    }

    #[tokio::test]
    async fn server_errors_are_retried_with_backoff() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/download/file.md"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/download/file.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let client = client(&server, dir.path());
        let content = client
            .download_file_content(&format!("{}/download/file.md", server.uri()))
            .await
            .unwrap();
        assert_eq!(content, "recovered");
    }
}
