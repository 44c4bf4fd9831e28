//! Curated list file reader.
//!
//! Format: one record per line. A line starting with `#` marks an excluded
//! domain (first token after the marker); any other non-blank line names an
//! accepted domain (first whitespace-delimited token). Anything after the
//! first token is free-form commentary.

use std::collections::HashSet;
use std::path::Path;

use sitefilter_shared::{Result, SiteFilterError};
use tracing::debug;

/// Rejection marker at the start of a line.
const EXCLUDED_MARKER: char = '#';

/// Domains contributed by one curated file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFragment {
    pub accepted: HashSet<String>,
    pub excluded: HashSet<String>,
}

impl SourceFragment {
    /// Fold another fragment into this one (set union).
    pub fn merge(&mut self, other: SourceFragment) {
        self.accepted.extend(other.accepted);
        self.excluded.extend(other.excluded);
    }
}

/// Read and parse one curated list file.
///
/// A missing or unreadable file is an error; callers treat it as fatal.
pub async fn read_source(path: &Path) -> Result<SourceFragment> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SiteFilterError::io(path, e))?;

    let fragment = parse_source(&content);
    debug!(
        path = %path.display(),
        accepted = fragment.accepted.len(),
        excluded = fragment.excluded.len(),
        "read curated source"
    );
    Ok(fragment)
}

/// Parse curated list content into accepted/excluded fragments.
pub fn parse_source(content: &str) -> SourceFragment {
    let mut fragment = SourceFragment::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXCLUDED_MARKER) {
            let rest = line.trim_matches(EXCLUDED_MARKER);
            if let Some(token) = rest.split_whitespace().next() {
                fragment.excluded.insert(token.to_string());
            }
        } else if let Some(token) = line.split_whitespace().next() {
            fragment.accepted.insert(token.to_string());
        }
    }

    fragment
}
