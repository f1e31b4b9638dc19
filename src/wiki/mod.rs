// Wiki REST client: the document source for ingestion.
// Thin I/O glue; the wiki is treated as an unreliable upstream.

#[cfg(test)]
mod tests;

pub mod extractor;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::WikiConfig;
use crate::retry::{RetryPolicy, with_backoff};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const PAGE_EXPAND_PARAMS: &str = "body.storage,version";

/// An immutable page snapshot, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    pub text: String,
    pub last_modified: DateTime<Utc>,
}

/// Client for a Confluence-compatible wiki REST API.
#[derive(Debug, Clone)]
pub struct WikiClient {
    base_url: Url,
    api_token: Option<String>,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
    title: String,
    #[serde(default)]
    body: Option<PageBody>,
    #[serde(default)]
    version: Option<PageVersion>,
    #[serde(rename = "_links", default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    storage: Option<StorageBody>,
}

#[derive(Debug, Deserialize)]
struct StorageBody {
    value: String,
}

#[derive(Debug, Deserialize)]
struct PageVersion {
    when: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageListResponse {
    #[serde(default)]
    results: Vec<PageResponse>,
}

impl WikiClient {
    #[inline]
    pub fn new(config: &WikiConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid wiki base URL: {}", config.base_url))?;

        // Joining relative API paths requires a trailing slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_token: config.api_token.clone(),
            agent,
            retry: RetryPolicy::new(
                DEFAULT_RETRY_ATTEMPTS,
                Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            ),
        })
    }

    /// Check whether the wiki API is reachable
    #[inline]
    pub fn test_connection(&self) -> bool {
        let url = match self.base_url.join("rest/api/content") {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("limit", "1");
                url
            }
            Err(e) => {
                warn!("Failed to build connection test URL: {}", e);
                return false;
            }
        };

        match self.get(&url, "wiki connection test") {
            Ok(_) => true,
            Err(e) => {
                warn!("Wiki connection test failed: {}", e);
                false
            }
        }
    }

    /// Fetch a single page by id, with content and metadata
    #[inline]
    pub fn fetch_page(&self, page_id: &str) -> Result<Document> {
        debug!("Fetching wiki page {}", page_id);

        let mut url = self
            .base_url
            .join(&format!("rest/api/content/{}", page_id))
            .context("Failed to build page URL")?;
        url.query_pairs_mut()
            .append_pair("expand", PAGE_EXPAND_PARAMS);

        let response_text = self
            .get(&url, "wiki page fetch")
            .with_context(|| format!("Failed to fetch page {}", page_id))?;

        let page: PageResponse = serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse page response for {}", page_id))?;

        Ok(self.to_document(page))
    }

    /// Fetch up to `limit` pages from a space
    #[inline]
    pub fn fetch_space_pages(&self, space_key: &str, limit: usize) -> Result<Vec<Document>> {
        debug!("Fetching up to {} pages from space {}", limit, space_key);

        let mut url = self
            .base_url
            .join("rest/api/content")
            .context("Failed to build space URL")?;
        url.query_pairs_mut()
            .append_pair("spaceKey", space_key)
            .append_pair("limit", &limit.to_string())
            .append_pair("expand", PAGE_EXPAND_PARAMS);

        let response_text = self
            .get(&url, "wiki space fetch")
            .with_context(|| format!("Failed to fetch pages from space {}", space_key))?;

        let list: PageListResponse = serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse space response for {}", space_key))?;

        let documents: Vec<Document> = list
            .results
            .into_iter()
            .map(|page| self.to_document(page))
            .collect();

        debug!(
            "Fetched {} pages from space {}",
            documents.len(),
            space_key
        );
        Ok(documents)
    }

    fn get(&self, url: &Url, label: &str) -> Result<String> {
        let response_text = with_backoff(&self.retry, label, || {
            let mut request = self.agent.get(url.as_str());
            if let Some(token) = &self.api_token {
                request = request.header("Authorization", &format!("Bearer {}", token));
            }
            request
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        Ok(response_text)
    }

    fn to_document(&self, page: PageResponse) -> Document {
        let html = page
            .body
            .and_then(|body| body.storage)
            .map(|storage| storage.value)
            .unwrap_or_default();

        let url = page
            .links
            .and_then(|links| links.webui)
            .and_then(|webui| self.base_url.join(&webui).ok())
            .map_or_else(|| self.base_url.to_string(), |joined| joined.to_string());

        let last_modified = page
            .version
            .and_then(|version| version.when)
            .unwrap_or(DateTime::UNIX_EPOCH);

        Document {
            id: page.id,
            title: page.title,
            url,
            text: extractor::html_to_text(&html),
            last_modified,
        }
    }
}
