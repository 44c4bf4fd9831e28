//! Accepted/excluded domain cache: building it from the curated sources and
//! loading it back.
//!
//! The cache is two plain-text files with one domain per line. The builder
//! rewrites both wholesale; the merge engine only ever appends to the
//! accepted one.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sitefilter_shared::{CachePaths, Result, SiteFilterError};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::normalize::normalize;
use crate::source::{SourceFragment, read_source};

/// Canonical accepted/excluded key sets held in memory during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainCache {
    pub accepted: HashSet<String>,
    pub excluded: HashSet<String>,
}

impl DomainCache {
    /// True if the key is already known either way.
    pub fn is_known(&self, key: &str) -> bool {
        self.accepted.contains(key) || self.excluded.contains(key)
    }
}

impl From<SourceFragment> for DomainCache {
    fn from(fragment: SourceFragment) -> Self {
        Self {
            accepted: fragment.accepted,
            excluded: fragment.excluded,
        }
    }
}

/// Both cache files exist.
pub fn cache_exists(cache: &CachePaths) -> bool {
    cache.accepted.is_file() && cache.excluded.is_file()
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Read every curated source concurrently and persist the merged sets.
///
/// One task per file; fragments are folded in as tasks finish. The first
/// failing read aborts the remaining tasks and nothing is written. The sets
/// are returned as read, before any exclusion-wins reconciliation.
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn build_cache(sources: &[PathBuf], cache: &CachePaths) -> Result<DomainCache> {
    let mut tasks = JoinSet::new();
    for path in sources {
        let path = path.clone();
        tasks.spawn(async move { read_source(&path).await });
    }

    let mut merged = SourceFragment::default();
    while let Some(joined) = tasks.join_next().await {
        let fragment = joined.map_err(|e| SiteFilterError::Task(e.to_string()))??;
        merged.merge(fragment);
    }

    persist(cache, &merged).await?;

    info!(
        accepted = merged.accepted.len(),
        excluded = merged.excluded.len(),
        "domain cache built"
    );

    Ok(merged.into())
}

/// Write both sets to temp files, then rename them into place.
///
/// Either both files are replaced or neither is; temp files never outlive a
/// failed call.
async fn persist(cache: &CachePaths, fragment: &SourceFragment) -> Result<()> {
    let accepted_tmp = stage(&cache.accepted, &fragment.accepted).await?;
    let excluded_tmp = match stage(&cache.excluded, &fragment.excluded).await {
        Ok(tmp) => tmp,
        Err(e) => {
            discard(&accepted_tmp).await;
            return Err(e);
        }
    };

    let swapped = swap_in(cache, &accepted_tmp, &excluded_tmp).await;
    if swapped.is_err() {
        discard(&accepted_tmp).await;
        discard(&excluded_tmp).await;
    }
    swapped
}

/// Rename the staged files over the live ones.
///
/// The live accepted file is moved aside first and put back if either rename
/// fails.
async fn swap_in(cache: &CachePaths, accepted_tmp: &Path, excluded_tmp: &Path) -> Result<()> {
    let backup = sibling(&cache.accepted, "bak");
    let had_previous = match tokio::fs::rename(&cache.accepted, &backup).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(SiteFilterError::io(&cache.accepted, e)),
    };

    if let Err(e) = tokio::fs::rename(accepted_tmp, &cache.accepted).await {
        restore(&backup, &cache.accepted, had_previous).await;
        return Err(SiteFilterError::io(&cache.accepted, e));
    }

    if let Err(e) = tokio::fs::rename(excluded_tmp, &cache.excluded).await {
        restore(&backup, &cache.accepted, had_previous).await;
        return Err(SiteFilterError::io(&cache.excluded, e));
    }

    if had_previous {
        discard(&backup).await;
    }
    Ok(())
}

/// Put the previous accepted file back, or remove the new one if there was
/// none.
async fn restore(backup: &Path, target: &Path, had_previous: bool) {
    let restored = if had_previous {
        tokio::fs::rename(backup, target).await
    } else {
        match tokio::fs::remove_file(target).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    };
    if let Err(e) = restored {
        warn!(path = %target.display(), error = %e, "failed to roll back cache file");
    }
}

/// Best-effort removal of a leftover file.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed leftover file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove leftover file"),
    }
}

/// Hidden `.name.ext` file next to `target`.
fn sibling(target: &Path, ext: &str) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".into());
    target.with_file_name(format!(".{file_name}.{ext}"))
}

/// Write a sorted set next to `target` and return the temp path.
async fn stage(target: &Path, domains: &HashSet<String>) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SiteFilterError::io(parent, e))?;
    }

    let temp = sibling(target, "tmp");

    let sorted: BTreeSet<&String> = domains.iter().collect();
    let mut content = String::new();
    for domain in sorted {
        content.push_str(domain);
        content.push('\n');
    }

    tokio::fs::write(&temp, content)
        .await
        .map_err(|e| SiteFilterError::io(&temp, e))?;
    debug!(path = %temp.display(), count = domains.len(), "staged cache file");

    Ok(temp)
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load both cache files as canonical keys.
///
/// A key present in both sets is dropped from `accepted`: exclusion wins.
#[instrument(skip_all, fields(accepted = %cache.accepted.display()))]
pub async fn load_cache(cache: &CachePaths, noise_prefixes: &[String]) -> Result<DomainCache> {
    let mut accepted = read_domain_set(&cache.accepted, noise_prefixes).await?;
    let excluded = read_domain_set(&cache.excluded, noise_prefixes).await?;

    let before = accepted.len();
    accepted.retain(|d| !excluded.contains(d));
    let conflicts = before - accepted.len();
    if conflicts > 0 {
        warn!(conflicts, "domains both accepted and excluded, keeping them excluded");
    }

    info!(
        accepted = accepted.len(),
        excluded = excluded.len(),
        "domain cache loaded"
    );

    Ok(DomainCache { accepted, excluded })
}

/// Read a one-per-line file into a set of normalized keys, skipping blanks.
pub async fn read_domain_set(path: &Path, noise_prefixes: &[String]) -> Result<HashSet<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SiteFilterError::io(path, e))?;

    Ok(content
        .lines()
        .map(|line| normalize(line, noise_prefixes))
        .filter(|key| !key.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sf-cache-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cache_paths(dir: &Path) -> CachePaths {
        CachePaths {
            accepted: dir.join("work").join("unique-sites"),
            excluded: dir.join("work").join("excluded-sites"),
        }
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn prefixes() -> Vec<String> {
        vec!["docs.".into(), "mirror.".into()]
    }

    #[tokio::test]
    async fn build_merges_all_sources_and_persists() {
        let tmp = temp_dir();
        let books = tmp.join("books");
        let math = tmp.join("math");
        std::fs::write(&books, "a.com\n# spam.com\nb.com notes\n").unwrap();
        std::fs::write(&math, "c.org\na.com\n# junk.net\n").unwrap();

        let cache = cache_paths(&tmp);
        assert!(!cache_exists(&cache));

        let merged = build_cache(&[books, math], &cache).await.unwrap();
        assert_eq!(merged.accepted, set(&["a.com", "b.com", "c.org"]));
        assert_eq!(merged.excluded, set(&["spam.com", "junk.net"]));

        assert!(cache_exists(&cache));
        let accepted = std::fs::read_to_string(&cache.accepted).unwrap();
        assert_eq!(accepted, "a.com\nb.com\nc.org\n");
        let excluded = std::fs::read_to_string(&cache.excluded).unwrap();
        assert_eq!(excluded, "junk.net\nspam.com\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn build_overwrites_previous_cache() {
        let tmp = temp_dir();
        let src = tmp.join("rest");
        std::fs::write(&src, "fresh.com\n").unwrap();

        let cache = cache_paths(&tmp);
        std::fs::create_dir_all(cache.accepted.parent().unwrap()).unwrap();
        std::fs::write(&cache.accepted, "stale.com\n").unwrap();
        std::fs::write(&cache.excluded, "stale-bad.com\n").unwrap();

        build_cache(&[src], &cache).await.unwrap();
        assert_eq!(std::fs::read_to_string(&cache.accepted).unwrap(), "fresh.com\n");
        assert_eq!(std::fs::read_to_string(&cache.excluded).unwrap(), "");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn build_fails_fast_without_persisting() {
        let tmp = temp_dir();
        let good = tmp.join("good");
        std::fs::write(&good, "ok.com\n").unwrap();
        let missing = tmp.join("does-not-exist");

        let cache = cache_paths(&tmp);
        let err = build_cache(&[good, missing], &cache).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!cache.accepted.exists());
        assert!(!cache.excluded.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn failed_swap_keeps_previous_cache() {
        let tmp = temp_dir();
        let src = tmp.join("rest");
        std::fs::write(&src, "new.com\n# bad.com\n").unwrap();

        let cache = cache_paths(&tmp);
        std::fs::create_dir_all(cache.accepted.parent().unwrap()).unwrap();
        std::fs::write(&cache.accepted, "old.com\n").unwrap();
        // A directory in the way makes the second rename fail.
        std::fs::create_dir_all(&cache.excluded).unwrap();

        assert!(build_cache(&[src], &cache).await.is_err());
        assert_eq!(std::fs::read_to_string(&cache.accepted).unwrap(), "old.com\n");

        let work = cache.accepted.parent().unwrap();
        for leftover in [".unique-sites.tmp", ".unique-sites.bak", ".excluded-sites.tmp"] {
            assert!(!work.join(leftover).exists(), "{leftover} left behind");
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn failed_swap_without_previous_cache_writes_nothing() {
        let tmp = temp_dir();
        let src = tmp.join("rest");
        std::fs::write(&src, "new.com\n").unwrap();

        let cache = cache_paths(&tmp);
        std::fs::create_dir_all(&cache.excluded).unwrap();

        assert!(build_cache(&[src], &cache).await.is_err());
        assert!(!cache.accepted.exists());
        assert!(!cache.excluded.parent().unwrap().join(".excluded-sites.tmp").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn fragment_converts_without_reconciling() {
        let fragment = SourceFragment {
            accepted: set(&["both.com"]),
            excluded: set(&["both.com"]),
        };
        let cache = DomainCache::from(fragment);
        assert!(cache.accepted.contains("both.com"));
        assert!(cache.excluded.contains("both.com"));
    }

    #[tokio::test]
    async fn load_normalizes_every_line() {
        let tmp = temp_dir();
        let cache = cache_paths(&tmp);
        std::fs::create_dir_all(cache.accepted.parent().unwrap()).unwrap();
        std::fs::write(
            &cache.accepted,
            "HTTPS://Docs.Example.com/guide\n\nmirror.kernel.org\nplain.net\n",
        )
        .unwrap();
        std::fs::write(&cache.excluded, "http://Bad.com\n").unwrap();

        let loaded = load_cache(&cache, &prefixes()).await.unwrap();
        assert_eq!(loaded.accepted, set(&["example.com", "kernel.org", "plain.net"]));
        assert_eq!(loaded.excluded, set(&["bad.com"]));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn load_lets_exclusion_win() {
        let tmp = temp_dir();
        let cache = cache_paths(&tmp);
        std::fs::create_dir_all(cache.accepted.parent().unwrap()).unwrap();
        std::fs::write(&cache.accepted, "both.com\nonly.com\n").unwrap();
        std::fs::write(&cache.excluded, "https://both.com\n").unwrap();

        let loaded = load_cache(&cache, &prefixes()).await.unwrap();
        assert_eq!(loaded.accepted, set(&["only.com"]));
        assert!(loaded.accepted.is_disjoint(&loaded.excluded));
        assert!(loaded.is_known("both.com"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn load_fails_when_a_file_is_missing() {
        let tmp = temp_dir();
        let cache = cache_paths(&tmp);
        std::fs::create_dir_all(cache.accepted.parent().unwrap()).unwrap();
        std::fs::write(&cache.accepted, "a.com\n").unwrap();

        let err = load_cache(&cache, &prefixes()).await.unwrap_err();
        assert!(err.is_not_found());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
