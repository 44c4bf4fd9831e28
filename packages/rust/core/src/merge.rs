//! Merge run: cache → candidates → filter → registry.
//!
//! 1. Ensure the domain cache exists (build it from the curated sources if not)
//! 2. Load the cache as canonical keys
//! 3. Load the candidate hand-off file and truncate it right away
//! 4. Drop candidates that are already accepted or excluded
//! 5. Reject covered suffixes and blacklisted phrases
//! 6. Append the accepted batch to the accepted cache, then to the registry

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use sitefilter_shared::{
    MergeConfig, RejectReason, RejectedDomain, RejectionPolicy, Result, RulesConfig,
    SiteFilterError,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::cache::{self, DomainCache};

// ---------------------------------------------------------------------------
// Report & progress
// ---------------------------------------------------------------------------

/// Summary of one merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// The cache had to be rebuilt from the curated sources.
    pub cache_rebuilt: bool,
    /// Distinct normalized candidates read from the hand-off file.
    pub candidates: usize,
    /// Candidates left after removing known domains.
    pub eligible: usize,
    /// Domains appended to the registry, in processing order.
    pub accepted: Vec<String>,
    /// Domains kept out and why.
    pub rejected: Vec<RejectedDomain>,
    /// Processing stopped at a rejection (`halt` policy).
    pub halted: bool,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting merge status.
pub trait MergeReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a domain was committed to the registry.
    fn accepted(&self, domain: &str);
    /// Called when a candidate is kept out.
    fn rejected(&self, rejected: &RejectedDomain);
    /// Called when the run completes.
    fn done(&self, report: &MergeReport);
}

/// No-op reporter for headless/test usage.
pub struct SilentReporter;

impl MergeReporter for SilentReporter {
    fn phase(&self, _name: &str) {}
    fn accepted(&self, _domain: &str) {}
    fn rejected(&self, _rejected: &RejectedDomain) {}
    fn done(&self, _report: &MergeReport) {}
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Outcome of checking one eligible domain against the rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

/// Check a domain against the suffix allowlist, then the phrase blacklist.
pub fn classify(domain: &str, rules: &RulesConfig) -> Verdict {
    if let Some(suffix) = rules
        .already_included_suffixes
        .iter()
        .find(|s| !s.is_empty() && domain.ends_with(s.as_str()))
    {
        return Verdict::Reject(RejectReason::AlreadyIncluded {
            suffix: suffix.clone(),
        });
    }

    if let Some(phrase) = rules
        .excluded_phrases
        .iter()
        .find(|p| !p.is_empty() && domain.contains(p.as_str()))
    {
        return Verdict::Reject(RejectReason::ExcludedPhrase {
            phrase: phrase.clone(),
        });
    }

    Verdict::Accept
}

/// `candidates − accepted − excluded`, sorted for a stable processing order.
pub fn eligible_candidates(candidates: &HashSet<String>, cache: &DomainCache) -> BTreeSet<String> {
    candidates
        .iter()
        .filter(|c| !cache.is_known(c))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run one merge of the candidate hand-off file into the registry.
#[instrument(skip_all, fields(registry = %config.registry.display(), policy = %config.rejection_policy))]
pub async fn run_merge(config: &MergeConfig, reporter: &dyn MergeReporter) -> Result<MergeReport> {
    let start = Instant::now();
    let mut report = MergeReport::default();
    let prefixes = &config.rules.noise_prefixes;

    // --- Phase 1: Ensure cache ---
    if !cache::cache_exists(&config.cache) {
        reporter.phase("Building domain cache");
        info!(sources = config.sources.len(), "domain cache missing, building");
        cache::build_cache(&config.sources, &config.cache).await?;
        report.cache_rebuilt = true;
    }

    // --- Phase 2: Load cache ---
    reporter.phase("Loading domain cache");
    let known = cache::load_cache(&config.cache, prefixes).await?;

    // --- Phase 3: Load & drain candidates ---
    reporter.phase("Reading candidates");
    let candidates = drain_candidates(&config.candidates, prefixes).await?;
    report.candidates = candidates.len();

    // --- Phase 4: Eligible set ---
    let eligible = eligible_candidates(&candidates, &known);
    report.eligible = eligible.len();
    info!(
        candidates = report.candidates,
        eligible = report.eligible,
        "computed eligible candidates"
    );

    // --- Phase 5: Filter ---
    reporter.phase("Merging candidates");
    let mut batch = Vec::new();
    for domain in eligible {
        match classify(&domain, &config.rules) {
            Verdict::Accept => {
                debug!(%domain, "site passes rules");
                batch.push(domain);
            }
            Verdict::Reject(reason) => {
                info!(%domain, %reason, "rejected site");
                let rejected = RejectedDomain { domain, reason };
                reporter.rejected(&rejected);
                report.rejected.push(rejected);

                if config.rejection_policy == RejectionPolicy::Halt {
                    warn!("halting merge at first rejection");
                    report.halted = true;
                    break;
                }
            }
        }
    }

    // --- Phase 6: Commit ---
    if !batch.is_empty() {
        let lines: String = batch.iter().map(|d| format!("{d}\n")).collect();
        let mut accepted_cache = open_append(&config.cache.accepted).await?;
        let mut registry = open_append(&config.registry).await?;
        append_batch(
            lines.as_bytes(),
            (&mut accepted_cache, config.cache.accepted.as_path()),
            (&mut registry, config.registry.as_path()),
        )
        .await?;

        for domain in batch {
            info!(%domain, "adding site");
            reporter.accepted(&domain);
            report.accepted.push(domain);
        }
    }

    report.elapsed = start.elapsed();
    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        halted = report.halted,
        elapsed_ms = report.elapsed.as_millis(),
        "merge completed"
    );
    reporter.done(&report);

    Ok(report)
}

/// Rebuild the domain cache from the curated sources unconditionally.
pub async fn rebuild_cache(config: &MergeConfig) -> Result<DomainCache> {
    cache::build_cache(&config.sources, &config.cache).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the hand-off file as normalized keys, then truncate it.
///
/// The batch is committed as consumed before any filtering happens; a crash
/// later in the run loses it instead of processing it twice.
async fn drain_candidates(path: &Path, noise_prefixes: &[String]) -> Result<HashSet<String>> {
    let candidates = match cache::read_domain_set(path, noise_prefixes).await {
        Ok(set) => set,
        Err(e) if e.is_not_found() => {
            debug!(path = %path.display(), "no candidate file, treating as empty batch");
            HashSet::new()
        }
        Err(e) => return Err(e),
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SiteFilterError::io(parent, e))?;
    }
    tokio::fs::write(path, "")
        .await
        .map_err(|e| SiteFilterError::io(path, e))?;

    Ok(candidates)
}

/// Write the accepted batch to the accepted cache, then to the registry.
///
/// A failure on the cache leaves the registry untouched. A failure on the
/// registry leaves the batch in the cache only, so a later run sees those
/// domains as known and never appends them twice.
async fn append_batch<C, R>(
    batch: &[u8],
    (cache, cache_path): (&mut C, &Path),
    (registry, registry_path): (&mut R, &Path),
) -> Result<()>
where
    C: AsyncWrite + Unpin,
    R: AsyncWrite + Unpin,
{
    write_all_flush(cache, batch)
        .await
        .map_err(|e| SiteFilterError::io(cache_path, e))?;
    write_all_flush(registry, batch)
        .await
        .map_err(|e| SiteFilterError::io(registry_path, e))
}

async fn write_all_flush<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Open a file for appending, creating it and its directory as needed.
async fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SiteFilterError::io(parent, e))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| SiteFilterError::io(path, e))
}
