//! Log hosting for build transcripts.
//!
//! The reporter links each vote to the full transcript through a
//! [`PasteService`]. Two backends are provided: an HTTP paste service and a
//! local content-addressed directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::PasteError;

/// Default public paste endpoint.
pub const DEFAULT_PASTE_ENDPOINT: &str = "https://pasteraw.com/api/v1/pastes";

/// Uploads text and returns a URL where it can be read.
#[async_trait]
pub trait PasteService: Send + Sync {
    async fn upload(&self, text: &str) -> Result<String, PasteError>;
}

/// HTTP paste service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasteConfig {
    pub endpoint: String,
    /// Per-request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PASTE_ENDPOINT.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Serialize)]
struct PasteRequest<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct PasteResponse {
    url: String,
}

/// Client for a paste service speaking `POST {"content"}` -> `{"url"}`.
pub struct HttpPasteClient {
    config: PasteConfig,
    http_client: Client,
}

impl HttpPasteClient {
    pub fn new(config: PasteConfig) -> Result<Self, PasteError> {
        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http_client = builder.build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

/// Pull the paste URL out of a response body.
///
/// Accepts `{"url": "..."}` or a bare URL on its own.
pub fn parse_paste_url(body: &str) -> Result<String, PasteError> {
    if let Ok(parsed) = serde_json::from_str::<PasteResponse>(body) {
        return Ok(parsed.url);
    }
    let trimmed = body.trim();
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_string()),
        _ => Err(PasteError::InvalidResponse(trimmed.chars().take(200).collect())),
    }
}

#[async_trait]
impl PasteService for HttpPasteClient {
    async fn upload(&self, text: &str) -> Result<String, PasteError> {
        debug!(endpoint = %self.config.endpoint, bytes = text.len(), "Uploading transcript");

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&PasteRequest { content: text })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PasteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_paste_url(&body)
    }
}

/// Stores transcripts as `<root>/<sha256>.log`.
///
/// Returns `file://` URLs unless a public base URL is configured, in which
/// case links are `<base>/<sha256>.log`.
#[derive(Debug, Clone)]
pub struct DirectoryPasteStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl DirectoryPasteStore {
    /// Create the store, creating `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PasteError> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self {
            root,
            public_base_url: None,
        })
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(text: &str) -> String {
        format!("{}.log", hex::encode(Sha256::digest(text.as_bytes())))
    }

    fn store(&self, text: &str) -> Result<PathBuf, PasteError> {
        let path = self.root.join(Self::file_name(text));
        if path.exists() {
            return Ok(path);
        }

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

#[async_trait]
impl PasteService for DirectoryPasteStore {
    async fn upload(&self, text: &str) -> Result<String, PasteError> {
        let path = self.store(text)?;
        debug!(path = %path.display(), "Stored transcript");

        if let Some(base) = &self.public_base_url {
            return Ok(format!("{}/{}", base, Self::file_name(text)));
        }
        Url::from_file_path(&path)
            .map(String::from)
            .map_err(|_| PasteError::InvalidResponse(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_url() {
        let url = parse_paste_url(r#"{"url": "https://paste.example.com/abc"}"#).unwrap();
        assert_eq!(url, "https://paste.example.com/abc");
    }

    #[test]
    fn test_parse_plain_url() {
        let url = parse_paste_url("https://paste.example.com/abc\n").unwrap();
        assert_eq!(url, "https://paste.example.com/abc");
    }

    #[test]
    fn test_parse_garbage_rejected() {
        assert!(matches!(
            parse_paste_url("<html>oops</html>"),
            Err(PasteError::InvalidResponse(_))
        ));
        assert!(parse_paste_url(r#"{"id": 4}"#).is_err());
        assert!(parse_paste_url("ftp://paste.example.com/abc").is_err());
    }

    #[tokio::test]
    async fn test_directory_store_writes_content_addressed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPasteStore::new(dir.path()).unwrap();

        let url = store.upload("$ echo ok\nok\n").await.unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".log"));
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        assert_eq!(fs::read_to_string(&path).unwrap(), "$ echo ok\nok\n");
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        assert_eq!(stem.len(), 64);
    }

    #[tokio::test]
    async fn test_directory_store_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPasteStore::new(dir.path()).unwrap();

        let a = store.upload("same").await.unwrap();
        let b = store.upload("same").await.unwrap();
        let c = store.upload("different").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_directory_store_public_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryPasteStore::new(dir.path())
            .unwrap()
            .with_public_base_url("https://logs.example.com/ci/");

        let url = store.upload("transcript").await.unwrap();

        assert!(url.starts_with("https://logs.example.com/ci/"));
        assert!(!url.contains("ci//"));
        assert!(url.ends_with(".log"));
    }

    #[test]
    fn test_directory_store_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let store = DirectoryPasteStore::new(&nested).unwrap();
        assert!(store.root().is_dir());
    }
}
