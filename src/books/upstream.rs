//! HTTP client for the upstream book catalogue.
//!
//! One tool call issues exactly one GET. There are no retries and no timeout
//! beyond the transport default; failures are surfaced to the caller. The
//! request is raced against the owning session's cancellation token so a
//! disconnect drops the in-flight fetch.

use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::UpstreamError;
use super::query::ValidatedQuery;

/// Public Gutendex search endpoint.
pub const DEFAULT_BASE_URL: &str = "https://gutendex.com/books";

/// Client for the upstream search API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
}

impl UpstreamClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn new(http: Client, base_url: &str) -> Result<Self, UpstreamError> {
        let base_url = parse_url(base_url)?;
        Ok(Self { http, base_url })
    }

    /// Builds a client with a `reqwest` default configuration and the given
    /// `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or `base_url` is
    /// invalid.
    pub fn with_user_agent(base_url: &str, user_agent: &str) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(UpstreamError::Transport)?;
        Self::new(http, base_url)
    }

    /// The search endpoint this client targets.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the single absolute URL for `query`.
    ///
    /// Continuations are used verbatim. Otherwise the normalised parameters
    /// are appended to the base endpoint in declared order.
    ///
    /// # Errors
    ///
    /// Returns an error if a continuation URL does not parse.
    pub fn request_url(&self, query: &ValidatedQuery) -> Result<Url, UpstreamError> {
        if let Some(url) = query.continuation_url() {
            return parse_url(url);
        }

        let mut url = self.base_url.clone();
        let pairs = query.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs.iter());
        }
        Ok(url)
    }

    /// Fetches and parses one page.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Status`] for a non-2xx response (body not read)
    /// - [`UpstreamError::Parse`] for a body that is not JSON
    /// - [`UpstreamError::Transport`] for connection failures
    /// - [`UpstreamError::Cancelled`] if `cancel` fires first
    pub async fn fetch(
        &self,
        query: &ValidatedQuery,
        cancel: &CancellationToken,
    ) -> Result<Value, UpstreamError> {
        let url = self.request_url(query)?;
        tracing::debug!(url = %url, "Fetching upstream page");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(url = %url, "Upstream fetch cancelled");
                Err(UpstreamError::Cancelled)
            }
            result = self.get_json(url.clone()) => {
                if let Err(ref e) = result {
                    tracing::warn!(url = %url, error = %e, "Upstream fetch failed");
                }
                result
            }
        }
    }

    async fn get_json(&self, url: Url) -> Result<Value, UpstreamError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::status(status));
        }

        let body = response.bytes().await.map_err(UpstreamError::Transport)?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Parse {
            message: e.to_string(),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, UpstreamError> {
    let url = Url::parse(raw).map_err(|e| UpstreamError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UpstreamError::InvalidUrl {
            url: raw.to_string(),
            message: "scheme must be http or https".to_string(),
        });
    }
    Ok(url)
}
