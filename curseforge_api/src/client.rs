//! HTTP client for the mod listing API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    query::{ModSearchQuery, Query},
    types::{Mod, PaginatedResponse},
    Error,
};

/// Responses larger than this are rejected rather than buffered.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("addonpulse/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the mod listing API.
///
/// One `reqwest::Client` is built up front and reused for every request.
/// Bodies are streamed through a size cap so a misbehaving upstream cannot
/// make us buffer an unbounded response.
pub struct Client {
    http: reqwest::Client,
    /// Base URL for the API. Defaults to `https://api.curseforge.com`.
    base_api_url: String,
    api_key: String,
    max_body_bytes: usize,
}

impl Client {
    /// Creates a new client pointing at the production API.
    pub fn new(api_key: &str) -> Result<Self, Error> {
        Self::with_base_url("https://api.curseforge.com", api_key)
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str, api_key: &str) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_api_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Overrides the response size cap.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn get_url(&self, path: &str, query: &impl Query) -> Result<Url, Error> {
        let url = Url::parse(format!("{}{}", &self.base_api_url, path).as_str()).map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::InvalidUrl(e.to_string())
        })?;
        Ok(query.add_to_url(&url))
    }

    async fn get<T, Q>(&self, path: &str, query: &Q) -> Result<T, Error>
    where
        T: DeserializeOwned,
        Q: Query,
    {
        let url = self.get_url(path, query)?;
        tracing::debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .header("accept", "application/json")
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        let retry_after = parse_retry_after(resp.headers(), Utc::now());
        let body = read_capped(resp, self.max_body_bytes).await?;

        if !status.is_success() {
            let snippet = truncate_body(&String::from_utf8_lossy(&body));
            tracing::error!("Request failed with status {}: {}", status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
                retry_after,
            });
        }

        serde_json::from_slice::<T>(&body).map_err(|e| {
            let snippet = truncate_body(&String::from_utf8_lossy(&body));
            tracing::error!("Failed to parse resource: {} | body: {}", e, snippet);
            Error::Parse(e.to_string())
        })
    }

    /// Fetches one page of search results.
    pub async fn search_mods(
        &self,
        query: &ModSearchQuery,
    ) -> Result<PaginatedResponse<Mod>, Error> {
        self.get::<PaginatedResponse<Mod>, ModSearchQuery>("/v1/mods/search", query)
            .await
    }
}

/// Reads the body chunk by chunk, failing as soon as it would exceed `limit`.
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> Result<Vec<u8>, Error> {
    if let Some(len) = resp.content_length() {
        if len > limit as u64 {
            return Err(Error::BodyTooLarge { limit });
        }
    }
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if buf.len() + chunk.len() > limit {
            return Err(Error::BodyTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Accepts both the delta-seconds and HTTP-date forms of `Retry-After`.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}
