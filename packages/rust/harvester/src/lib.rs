//! Search-result harvester: the producer of the candidate hand-off file.
//!
//! Runs a web search for the given terms (plus the configured exclusion
//! operators), walks a bounded number of result pages, reduces every hit to
//! its host and appends the distinct hosts to the hand-off file that the
//! merge consumes.

mod client;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use sitefilter_shared::{Result, SearchConfig, SiteFilterError};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Hosts with more labels than this keep only their last `MAX_HOST_LABELS`.
const MAX_HOST_LABELS: usize = 4;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime search configuration, resolved from [`SearchConfig`] and the env.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Search API endpoint.
    pub endpoint: String,
    /// API key.
    pub api_key: String,
    /// Search engine id.
    pub engine_id: String,
    /// Number of result pages to request.
    pub max_pages: u32,
    /// Optional proxy for every request.
    pub proxy: Option<String>,
    /// Retries on `retry_status` before a page is given up.
    pub max_retries: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    /// Status code treated as transient.
    pub retry_status: u16,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Operators appended to the query.
    pub excluded_terms: Vec<String>,
    /// Hits whose title contains any of these are dropped.
    pub banned_title_phrases: Vec<String>,
}

impl SearchOptions {
    /// Resolve options, reading the credentials from the configured env vars.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: require_env(&config.api_key_env, "search API key")?,
            engine_id: require_env(&config.engine_id_env, "search engine id")?,
            max_pages: config.max_pages,
            proxy: config.proxy.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            retry_status: config.retry_status,
            timeout_secs: config.timeout_secs,
            excluded_terms: config.excluded_terms.clone(),
            banned_title_phrases: config
                .banned_title_phrases
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        })
    }
}

fn require_env(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SiteFilterError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Harvest
// ---------------------------------------------------------------------------

/// Outcome of a harvest.
#[derive(Debug, Clone, Default)]
pub struct HarvestResult {
    /// The full query sent to the search API.
    pub query: String,
    /// Pages that returned results.
    pub pages_fetched: u32,
    /// Distinct hosts and the title of the last hit seen for each.
    pub sites: BTreeMap<String, String>,
}

/// Search for `terms` and collect the distinct result hosts.
///
/// Pagination stops at the first page without results or at the first
/// request that fails for a reason other than the transient status; what
/// was gathered until then is kept.
#[instrument(skip_all, fields(terms = terms.len(), max_pages = opts.max_pages))]
pub async fn harvest(terms: &[String], opts: &SearchOptions) -> Result<HarvestResult> {
    if terms.iter().all(|t| t.trim().is_empty()) {
        return Err(SiteFilterError::validation("search query is empty"));
    }

    let query = build_query(terms, &opts.excluded_terms);
    info!(%query, len = query.len(), "search query");

    let client = client::build_client(opts)?;
    let mut result = HarvestResult {
        query,
        ..Default::default()
    };

    for page in 1..=opts.max_pages {
        let start = client::page_start(page);
        let data = match client::fetch_page(&client, opts, &result.query, start).await {
            Ok(data) => data,
            Err(e) => {
                warn!(page, error = %e, "search request failed, stopping");
                break;
            }
        };

        let Some(items) = data.items else {
            info!(page, "no more results");
            break;
        };
        result.pages_fetched += 1;

        for item in items {
            let site = clean_host(&item.display_link);
            if site.is_empty() {
                continue;
            }
            if let Some(banned) = opts
                .banned_title_phrases
                .iter()
                .find(|p| item.title.contains(p.as_str()))
            {
                debug!(%site, title = %item.title, %banned, "dropping result with banned title");
                continue;
            }
            result.sites.insert(site, item.title);
        }
    }

    info!(
        pages = result.pages_fetched,
        sites = result.sites.len(),
        "search completed"
    );

    Ok(result)
}

/// User terms followed by the exclusion operators, space separated.
pub fn build_query(terms: &[String], excluded_terms: &[String]) -> String {
    terms
        .iter()
        .chain(excluded_terms)
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduce a result's display host: drop a leading `www` label and keep at
/// most the last four labels.
pub fn clean_host(display_link: &str) -> String {
    let mut site = display_link.trim();

    if site.starts_with("www") {
        site = site.split_once('.').map_or("", |(_, rest)| rest);
    }

    let labels: Vec<&str> = site.split('.').collect();
    if labels.len() > MAX_HOST_LABELS {
        labels[labels.len() - MAX_HOST_LABELS..].join(".")
    } else {
        site.to_string()
    }
}

// ---------------------------------------------------------------------------
// Hand-off
// ---------------------------------------------------------------------------

/// Append sites to the hand-off file, one per line.
///
/// Creates the file and its directory on first use; does nothing when
/// `sites` is empty. Returns the number of lines written.
pub async fn write_handoff<'a, I>(path: &Path, sites: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut content = String::new();
    let mut count = 0;
    for site in sites {
        content.push_str(site);
        content.push('\n');
        count += 1;
    }

    if count == 0 {
        return Ok(0);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SiteFilterError::io(parent, e))?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| SiteFilterError::io(path, e))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| SiteFilterError::io(path, e))?;
    file.flush().await.map_err(|e| SiteFilterError::io(path, e))?;

    info!(path = %path.display(), count, "wrote candidates to hand-off file");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opts(server: &MockServer) -> SearchOptions {
        SearchOptions {
            endpoint: format!("{}/customsearch/v1", server.uri()),
            api_key: "test-key".into(),
            engine_id: "test-cx".into(),
            max_pages: 5,
            proxy: None,
            max_retries: 3,
            retry_delay: Duration::from_millis(0),
            retry_status: 503,
            timeout_secs: 5,
            excluded_terms: vec!["-inurl:github".into()],
            banned_title_phrases: vec![],
        }
    }

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn page(hits: &[(&str, &str)]) -> serde_json::Value {
        let items: Vec<_> = hits
            .iter()
            .map(|(title, link)| serde_json::json!({ "title": title, "displayLink": link }))
            .collect();
        serde_json::json!({ "items": items })
    }

    // -----------------------------------------------------------------------
    // Pure helpers
    // -----------------------------------------------------------------------

    #[test]
    fn query_appends_exclusions() {
        let q = build_query(
            &terms(&["cnc", " milling "]),
            &terms(&["-inurl:ebay", "", "-inurl:gov"]),
        );
        assert_eq!(q, "cnc milling -inurl:ebay -inurl:gov");
    }

    #[test]
    fn clean_host_drops_www() {
        assert_eq!(clean_host("www.example.com"), "example.com");
        assert_eq!(clean_host("www2.example.com"), "example.com");
        assert_eq!(clean_host("www"), "");
        assert_eq!(clean_host("example.com"), "example.com");
    }

    #[test]
    fn clean_host_keeps_last_four_labels() {
        assert_eq!(clean_host("a.b.c.example.co.uk"), "c.example.co.uk");
        assert_eq!(clean_host("b.c.example.com"), "b.c.example.com");
        assert_eq!(clean_host("www.a.b.c.example.com"), "b.c.example.com");
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let config = SearchConfig {
            api_key_env: "SF_TEST_NONEXISTENT_KEY_98765".into(),
            ..SearchConfig::default()
        };
        let err = SearchOptions::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("SF_TEST_NONEXISTENT_KEY_98765"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let server = MockServer::start().await;
        let err = harvest(&terms(&["  "]), &opts(&server)).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    // -----------------------------------------------------------------------
    // Against a mock search API
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn paginates_until_no_items() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "1"))
            .and(query_param("q", "lathe -inurl:github"))
            .and(query_param("key", "test-key"))
            .and(query_param("cx", "test-cx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[
                ("Lathe basics", "www.lathes.com"),
                ("Deep host", "a.b.c.shop.example.org"),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[(
                "More lathes",
                "cnc.example.net",
            )])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "21"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "kind": "x" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = harvest(&terms(&["lathe"]), &opts(&server)).await.unwrap();
        assert_eq!(result.pages_fetched, 2);
        assert_eq!(
            result.sites.keys().cloned().collect::<Vec<_>>(),
            vec![
                "c.shop.example.org".to_string(),
                "cnc.example.net".to_string(),
                "lathes.com".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stops_after_max_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page(&[("t", "same.example.com")])),
            )
            .expect(2)
            .mount(&server)
            .await;

        let mut o = opts(&server);
        o.max_pages = 2;
        let result = harvest(&terms(&["x"]), &o).await.unwrap();
        assert_eq!(result.pages_fetched, 2);
        assert_eq!(result.sites.len(), 1);
    }

    #[tokio::test]
    async fn retries_transient_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[("ok", "found.org")])))
            .mount(&server)
            .await;

        let mut o = opts(&server);
        o.max_pages = 1;
        let result = harvest(&terms(&["x"]), &o).await.unwrap();
        assert!(result.sites.contains_key("found.org"));
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let server = MockServer::start().await;

        // One attempt plus three retries, then the page counts as empty.
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4)
            .mount(&server)
            .await;

        let result = harvest(&terms(&["x"]), &opts(&server)).await.unwrap();
        assert_eq!(result.pages_fetched, 0);
        assert!(result.sites.is_empty());
    }

    #[tokio::test]
    async fn other_errors_stop_but_keep_earlier_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[("a", "first.com")])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "11"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let result = harvest(&terms(&["x"]), &opts(&server)).await.unwrap();
        assert_eq!(result.pages_fetched, 1);
        assert!(result.sites.contains_key("first.com"));
    }

    #[tokio::test]
    async fn banned_titles_are_dropped() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("start", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&[
                ("Buy cheap tools now", "spam.example.com"),
                ("Machining handbook", "good.example.com"),
            ])))
            .mount(&server)
            .await;

        let mut o = opts(&server);
        o.max_pages = 1;
        o.banned_title_phrases = vec!["cheap".into()];
        let result = harvest(&terms(&["x"]), &o).await.unwrap();
        assert_eq!(
            result.sites.keys().cloned().collect::<Vec<_>>(),
            vec!["good.example.com".to_string()]
        );
    }

    // -----------------------------------------------------------------------
    // Hand-off file
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn handoff_appends_lines() {
        let dir = std::env::temp_dir().join(format!("sf-handoff-test-{}", uuid::Uuid::now_v7()));
        let file = dir.join("work").join("google-results");

        let written = write_handoff(&file, ["a.com", "b.com"]).await.unwrap();
        assert_eq!(written, 2);
        write_handoff(&file, ["c.com"]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a.com\nb.com\nc.com\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn handoff_skips_empty_batches() {
        let dir = std::env::temp_dir().join(format!("sf-handoff-test-{}", uuid::Uuid::now_v7()));
        let file = dir.join("google-results");

        let written = write_handoff(&file, std::iter::empty::<&str>()).await.unwrap();
        assert_eq!(written, 0);
        assert!(!file.exists());
    }
}
