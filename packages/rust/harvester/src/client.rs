//! Search API client with retry on the transient status.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use sitefilter_shared::{Result, SiteFilterError};
use tracing::{debug, warn};
use url::Url;

use crate::SearchOptions;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// Results per page of the search API; drives the `start` offset.
pub(crate) const PAGE_SIZE: u32 = 10;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("SiteFilter/", env!("CARGO_PKG_VERSION"));

/// The slice of a search API page we care about.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SearchPage {
    /// Absent when the query has no (more) results.
    #[serde(default)]
    pub items: Option<Vec<SearchItem>>,
}

/// A single search hit.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SearchItem {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "displayLink")]
    pub display_link: String,
}

/// Build a reqwest client with user agent, timeout and optional proxy.
pub(crate) fn build_client(opts: &SearchOptions) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs));

    if let Some(proxy) = &opts.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| SiteFilterError::config(format!("invalid proxy '{proxy}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| SiteFilterError::Network(format!("failed to build HTTP client: {e}")))
}

/// `start` offset (1-based) of a 1-based page number.
pub(crate) fn page_start(page: u32) -> u32 {
    (page - 1) * PAGE_SIZE + 1
}

/// Fetch one result page.
///
/// The transient status is retried up to `max_retries` times; after that the
/// page counts as empty. Any other failure is an error.
pub(crate) async fn fetch_page(
    client: &Client,
    opts: &SearchOptions,
    query: &str,
    start: u32,
) -> Result<SearchPage> {
    let mut url = Url::parse(&opts.endpoint).map_err(|e| {
        SiteFilterError::config(format!("invalid search endpoint '{}': {e}", opts.endpoint))
    })?;
    url.query_pairs_mut()
        .append_pair("key", &opts.api_key)
        .append_pair("cx", &opts.engine_id)
        .append_pair("q", query)
        .append_pair("start", &start.to_string());

    let mut failures: u32 = 0;

    loop {
        // Errors carry the URL, which carries the API key.
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SiteFilterError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SearchPage>()
                .await
                .map_err(|e| SiteFilterError::parse(format!("search response: {}", e.without_url())));
        }

        if status.as_u16() != opts.retry_status {
            return Err(SiteFilterError::Network(format!("search API: HTTP {status}")));
        }

        failures += 1;
        if failures > opts.max_retries {
            warn!(start, %status, failures, "giving up on page after retries");
            return Ok(SearchPage::default());
        }

        debug!(start, %status, attempt = failures, "transient status, retrying");
        tokio::time::sleep(opts.retry_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offsets() {
        assert_eq!(page_start(1), 1);
        assert_eq!(page_start(2), 11);
        assert_eq!(page_start(5), 41);
    }

    #[test]
    fn page_without_items_deserializes() {
        let page: SearchPage =
            serde_json::from_str(r#"{"kind": "customsearch#search"}"#).unwrap();
        assert!(page.items.is_none());
    }

    #[test]
    fn item_without_title_deserializes() {
        let page: SearchPage =
            serde_json::from_str(r#"{"items": [{"displayLink": "example.com"}]}"#).unwrap();
        let items = page.items.unwrap();
        assert_eq!(items[0].display_link, "example.com");
        assert_eq!(items[0].title, "");
    }
}
