//! Application configuration for SiteFilter.
//!
//! User config lives at `~/.sitefilter/sitefilter.toml`.
//! Every section is optional; missing values fall back to the built-in
//! defaults, which reproduce the long-standing curated setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteFilterError};
use crate::types::RejectionPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitefilter.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitefilter";

// ---------------------------------------------------------------------------
// Built-in rule tables
// ---------------------------------------------------------------------------

const DEFAULT_SOURCE_FILES: &[&str] = &[
    "books",
    "cnc",
    "dictionaries",
    "economy",
    "exceptionsitelist",
    "informatics",
    "informatics2",
    "math",
    "radio",
    "recipes",
    "rest",
    "rest2",
    "spiritual",
    "to-sort-0",
    "to-sort-1",
];

const DEFAULT_EXCLUDED_PHRASES: &[&str] = &[
    "4chan", "abcnews", "aliexpress", "alibaba", "allegro", "amazon", "arvix.org",
    "audio", "bbc", "blogspot", "book", "buy", "chomikuj", "cosplay", "czyta",
    "dailymotion", "demotywatory", "discord", "disboard", "ebay", "eska", "etsy",
    "facebook", "fakt.pl", "film", "flickr", "gallery", "github", "giphy", "google",
    "health", "herokuapp", "image", "imdb", "instagram", "interia", "issuu", "ksiazk",
    "media", "nationalgeographic", "msn.com", "newsweek", "nk.pl", "onet.", "photo",
    "pics", "picture", "pinterest", "psu.ed", "pudelek", "readthedocs", "reddit",
    "shop", "shutterstock", "slide", "smog.pl", "sport", "stack", "steemit", "travel",
    "trip", "tube", "tumblr", "tv", "twitter", "usc.edu", "vimeo", "vk.com", "yandex",
    "youtube", "walmart", "wizaz", "wordpress", "wp.pl", "wyborcza",
];

const DEFAULT_ALREADY_INCLUDED_SUFFIXES: &[&str] = &[
    "ac.at", "ac.bd", "ac.be", "ac.cn", "ac.cy", "ac.fj", "ac.id", "ac.il", "ac.in",
    "ac.ir", "ac.jp", "ac.ke", "ac.kr", "ac.lk", "ac.ma", "ac.nz", "ac.rs", "ac.ru",
    "ac.rw", "ac.ss", "ac.th", "ac.tz", "ac.ug", "ac.uk", "ac.za", "ar.al", "bl.uk",
    "c2.com", "edu.pl", "europa.eu", "go.jp", "inria.fr", "gov.pl", "nj.us", "sap.com",
    "uc.pt", "uu.nl", "waw.pl", "zendesk.com",
];

const DEFAULT_NOISE_PREFIXES: &[&str] = &[
    "blog.", "bugs.", "dev.", "discuss.", "doc.", "docs.", "forum.", "forums.", "ftp.",
    "git.", "jira.", "mail.", "man.", "mirror.", "mirrors.", "py.", "src.", "support.",
    "wiki.",
];

/// Query operators appended to every search to keep well-known hosts out.
const DEFAULT_EXCLUDED_TERMS: &[&str] = &[
    "-inurl:stackoverflow", "-inurl:serverfault", "-inurl:edu.au", "-inurl:github",
    "-inurl:quora", "-inurl:elsevier", "-inurl:ebay", "-inurl:arxiv",
    "-inurl:stackexchange", "-inurl:ieee", "-inurl:readthedocs", "-inurl:youtube",
    "-inurl:wikipedia", "-inurl:yahoo", "-inurl:stanford", "-inurl:psu.edu",
    "-inurl:ac.uk", "-inurl:readthedocs.io", "-inurl:medium", "-inurl:apache",
    "-inurl:techtarget", "-inurl:facebook", "-inurl:linkedin", "-inurl:amazon",
    "-inurl:google", "-inurl:twitter", "-inurl:reddit", "-inurl:pinterest",
    "-inurl:chomikuj", "-inurl:ncbi", "-inurl:edu", "-inurl:gov",
];

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ---------------------------------------------------------------------------
// Config structs (matching sitefilter.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache, hand-off and registry locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Curated source lists.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Filtering and normalization rules.
    #[serde(default)]
    pub rules: RulesConfig,

    /// Merge behaviour.
    #[serde(default)]
    pub merge: MergeSettings,

    /// Search harvester settings.
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Scratch directory holding the caches and the hand-off file.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Accepted-domain cache (relative to `work_dir` unless absolute).
    #[serde(default = "default_accepted_cache")]
    pub accepted_cache: String,

    /// Excluded-domain cache (relative to `work_dir` unless absolute).
    #[serde(default = "default_excluded_cache")]
    pub excluded_cache: String,

    /// Candidate hand-off file (relative to `work_dir` unless absolute).
    #[serde(default = "default_candidates")]
    pub candidates: String,

    /// Append-only registry that receives accepted domains.
    #[serde(default = "default_registry")]
    pub registry: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            accepted_cache: default_accepted_cache(),
            excluded_cache: default_excluded_cache(),
            candidates: default_candidates(),
            registry: default_registry(),
        }
    }
}

fn default_work_dir() -> String {
    "/tmp/sitefilter".into()
}
fn default_accepted_cache() -> String {
    "unique-sites".into()
}
fn default_excluded_cache() -> String {
    "excluded-sites".into()
}
fn default_candidates() -> String {
    "google-results".into()
}
fn default_registry() -> String {
    "~/Projects/sitefilter/rest2".into()
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directory holding the curated list files.
    #[serde(default = "default_sources_dir")]
    pub dir: String,

    /// Curated list file names (relative to `dir` unless absolute).
    #[serde(default = "default_source_files")]
    pub files: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dir: default_sources_dir(),
            files: default_source_files(),
        }
    }
}

fn default_sources_dir() -> String {
    "~/Projects/sitefilter".into()
}
fn default_source_files() -> Vec<String> {
    to_strings(DEFAULT_SOURCE_FILES)
}

/// `[rules]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// A candidate containing any of these substrings is rejected.
    #[serde(default = "default_excluded_phrases")]
    pub excluded_phrases: Vec<String>,

    /// A candidate ending with any of these is already covered and rejected.
    #[serde(default = "default_already_included_suffixes")]
    pub already_included_suffixes: Vec<String>,

    /// Subdomain prefixes stripped during normalization, in priority order.
    #[serde(default = "default_noise_prefixes")]
    pub noise_prefixes: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            excluded_phrases: default_excluded_phrases(),
            already_included_suffixes: default_already_included_suffixes(),
            noise_prefixes: default_noise_prefixes(),
        }
    }
}

fn default_excluded_phrases() -> Vec<String> {
    to_strings(DEFAULT_EXCLUDED_PHRASES)
}
fn default_already_included_suffixes() -> Vec<String> {
    to_strings(DEFAULT_ALREADY_INCLUDED_SUFFIXES)
}
fn default_noise_prefixes() -> Vec<String> {
    to_strings(DEFAULT_NOISE_PREFIXES)
}

/// `[merge]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeSettings {
    /// `skip` (continue after a rejection) or `halt` (stop the batch).
    #[serde(default)]
    pub rejection_policy: RejectionPolicy,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Custom Search JSON API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the search engine id.
    #[serde(default = "default_engine_id_env")]
    pub engine_id_env: String,

    /// Number of result pages to request.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Optional proxy for every request (e.g. `http://127.0.0.1:8081`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Retries on the transient status before a page is given up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries in ms.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// HTTP status treated as transient.
    #[serde(default = "default_retry_status")]
    pub retry_status: u16,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Operators appended to every query.
    #[serde(default = "default_excluded_terms")]
    pub excluded_terms: Vec<String>,

    /// Results whose title contains any of these are dropped.
    #[serde(default)]
    pub banned_title_phrases: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            engine_id_env: default_engine_id_env(),
            max_pages: default_max_pages(),
            proxy: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_status: default_retry_status(),
            timeout_secs: default_timeout_secs(),
            excluded_terms: default_excluded_terms(),
            banned_title_phrases: Vec::new(),
        }
    }
}

fn default_endpoint() -> String {
    "https://customsearch.googleapis.com/customsearch/v1".into()
}
fn default_api_key_env() -> String {
    "SITEFILTER_SEARCH_API_KEY".into()
}
fn default_engine_id_env() -> String {
    "SITEFILTER_SEARCH_ENGINE_ID".into()
}
fn default_max_pages() -> u32 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_retry_status() -> u16 {
    503
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_excluded_terms() -> Vec<String> {
    to_strings(DEFAULT_EXCLUDED_TERMS)
}

// ---------------------------------------------------------------------------
// Merge config (runtime, resolved from AppConfig)
// ---------------------------------------------------------------------------

/// Locations of the two persisted cache files.
#[derive(Debug, Clone)]
pub struct CachePaths {
    pub accepted: PathBuf,
    pub excluded: PathBuf,
}

/// Runtime merge configuration with every path resolved.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Curated source files fed to the cache builder.
    pub sources: Vec<PathBuf>,
    /// Persisted accepted/excluded caches.
    pub cache: CachePaths,
    /// Candidate hand-off file.
    pub candidates: PathBuf,
    /// Append-only registry.
    pub registry: PathBuf,
    /// Filtering and normalization rules.
    pub rules: RulesConfig,
    /// What happens after a rejection.
    pub rejection_policy: RejectionPolicy,
}

impl TryFrom<&AppConfig> for MergeConfig {
    type Error = SiteFilterError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let work_dir = expand_home(&config.paths.work_dir)?;
        let sources_dir = expand_home(&config.sources.dir)?;

        let sources = config
            .sources
            .files
            .iter()
            .map(|f| resolve_in(&sources_dir, f))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sources,
            cache: CachePaths {
                accepted: resolve_in(&work_dir, &config.paths.accepted_cache)?,
                excluded: resolve_in(&work_dir, &config.paths.excluded_cache)?,
            },
            candidates: candidates_path(config)?,
            registry: expand_home(&config.paths.registry)?,
            rules: config.rules.clone(),
            rejection_policy: config.merge.rejection_policy,
        })
    }
}

/// Resolved location of the candidate hand-off file.
pub fn candidates_path(config: &AppConfig) -> Result<PathBuf> {
    let work_dir = expand_home(&config.paths.work_dir)?;
    resolve_in(&work_dir, &config.paths.candidates)
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if path == "~" || path.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SiteFilterError::config("could not determine home directory"))?;
        let rest = path.trim_start_matches('~').trim_start_matches('/');
        return Ok(if rest.is_empty() { home } else { home.join(rest) });
    }
    Ok(PathBuf::from(path))
}

/// Resolve `name` against `base` unless it is already absolute (or `~`-rooted).
fn resolve_in(base: &Path, name: &str) -> Result<PathBuf> {
    let expanded = expand_home(name)?;
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base.join(expanded))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitefilter/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteFilterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitefilter/sitefilter.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteFilterError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteFilterError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteFilterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteFilterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteFilterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
