//! Gerrit REST client
//!
//! Authenticated access to the `/a/` REST endpoints. Every response body
//! starts with a `)]}'` guard line that must be dropped before the JSON
//! payload can be parsed.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::change::{Change, QueryOption, ReviewInput};
use crate::error::{ReviewError, Result};
use crate::service::ReviewService;

/// Review-service connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Base URL of the authenticated API, e.g. `https://review.example.com/a`
    pub base_url: String,
    /// HTTP username
    pub username: String,
    /// HTTP password
    pub password: String,
    /// Per-request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl ReviewConfig {
    /// Config for the authenticated API of `host`
    pub fn for_host(host: &str, username: &str, password: &str) -> Self {
        ReviewConfig {
            base_url: format!("https://{host}/a"),
            username: username.to_string(),
            password: password.to_string(),
            timeout_secs: 60,
            user_agent: format!("gatekeeper/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Point the client somewhere other than `https://{host}/a`
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Drop the anti-hijacking first line of a response body.
///
/// Returns `None` if the body has no line break at all.
pub fn strip_magic_prefix(body: &str) -> Option<&str> {
    body.split_once('\n').map(|(_, payload)| payload)
}

/// Gerrit client holding one authenticated HTTP session
pub struct GerritClient {
    config: ReviewConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl GerritClient {
    /// Create a new client
    pub fn new(config: ReviewConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ReviewError::InvalidConfig(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ReviewError::InvalidConfig(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http_client = builder.build()?;

        Ok(GerritClient {
            config,
            base,
            http_client,
        })
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    /// Build `{base}/seg/seg/...`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ReviewError::InvalidConfig(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(method = %method, url = %url, "review-service request");
        self.http_client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    /// Send a request and return the payload after the guard line.
    async fn send(&self, builder: RequestBuilder) -> Result<String> {
        let response = builder.send().await?;
        let url = response.url().to_string();
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ReviewError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                url,
                body,
            });
        }

        strip_magic_prefix(&body)
            .map(str::to_string)
            .ok_or(ReviewError::MissingPrefix { url })
    }

    async fn get_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let payload = self.send(builder).await?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// POST a mutation; the returned entity is validated as JSON and dropped.
    async fn post(&self, url: Url, body: Option<serde_json::Value>) -> Result<()> {
        let mut builder = self.request(Method::POST, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let payload = self.send(builder).await?;
        if !payload.trim().is_empty() {
            let _: serde_json::Value = serde_json::from_str(&payload)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewService for GerritClient {
    async fn query(&self, filter: &str, options: &[QueryOption]) -> Result<Vec<Change>> {
        let url = self.endpoint(&["changes", ""])?;
        let mut params: Vec<(&str, &str)> = vec![("q", filter)];
        params.extend(options.iter().map(|o| ("o", o.as_str())));

        self.get_json(self.request(Method::GET, url).query(&params))
            .await
    }

    async fn post_review(
        &self,
        change_id: &str,
        revision_id: &str,
        input: &ReviewInput,
    ) -> Result<()> {
        let url = self.endpoint(&["changes", change_id, "revisions", revision_id, "review", ""])?;
        self.post(url, Some(serde_json::to_value(input)?)).await
    }

    async fn submit(&self, change_id: &str, revision_id: &str) -> Result<()> {
        let url = self.endpoint(&["changes", change_id, "revisions", revision_id, "submit"])?;
        self.post(url, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_magic_prefix_drops_first_line() {
        assert_eq!(strip_magic_prefix(")]}'\n[]"), Some("[]"));
        assert_eq!(strip_magic_prefix(")]}'\n{\"a\":\n1}"), Some("{\"a\":\n1}"));
        assert_eq!(strip_magic_prefix("[]"), None);
    }

    #[test]
    fn for_host_uses_authenticated_prefix() {
        let config = ReviewConfig::for_host("review.example.com", "bot", "secret");
        assert_eq!(config.base_url, "https://review.example.com/a");
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn debug_redacts_password() {
        let config = ReviewConfig::for_host("review.example.com", "bot", "hunter2");
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn endpoint_encodes_segments() {
        let client =
            GerritClient::new(ReviewConfig::for_host("review.example.com", "bot", "pw")).unwrap();
        let url = client
            .endpoint(&["changes", "demo~master~I12", "revisions", "abc", "review", ""])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://review.example.com/a/changes/demo~master~I12/revisions/abc/review/"
        );

        let url = client.endpoint(&["changes", "team/demo~master~I12"]).unwrap();
        assert!(url.as_str().ends_with("/changes/team%2Fdemo~master~I12"));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash_in_base() {
        let config = ReviewConfig::for_host("h", "u", "p").with_base_url("https://h/a/");
        let client = GerritClient::new(config).unwrap();
        let url = client.endpoint(&["changes", ""]).unwrap();
        assert_eq!(url.as_str(), "https://h/a/changes/");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let config = ReviewConfig::for_host("h", "u", "p").with_base_url("not a url");
        assert!(matches!(
            GerritClient::new(config),
            Err(ReviewError::InvalidConfig(_))
        ));
    }
}
