//! Core domain types shared by the merge engine and the CLI.

use serde::{Deserialize, Serialize};

use crate::error::SiteFilterError;

// ---------------------------------------------------------------------------
// RejectionPolicy
// ---------------------------------------------------------------------------

/// What the merge does with the rest of the batch after a candidate is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionPolicy {
    /// Skip the rejected candidate and keep going.
    #[default]
    Skip,
    /// Stop processing the batch at the first rejection.
    Halt,
}

impl RejectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Halt => "halt",
        }
    }
}

impl std::fmt::Display for RejectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RejectionPolicy {
    type Err = SiteFilterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "halt" => Ok(Self::Halt),
            other => Err(SiteFilterError::validation(format!(
                "unknown rejection policy '{other}': expected 'skip' or 'halt'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Rejection
// ---------------------------------------------------------------------------

/// Why a candidate domain was kept out of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Ends with a suffix that is already covered as a whole.
    AlreadyIncluded { suffix: String },
    /// Contains a blacklisted phrase.
    ExcludedPhrase { phrase: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyIncluded { suffix } => write!(f, "already included by suffix '{suffix}'"),
            Self::ExcludedPhrase { phrase } => write!(f, "contains excluded phrase '{phrase}'"),
        }
    }
}

/// A candidate that did not make it into the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedDomain {
    pub domain: String,
    pub reason: RejectReason,
}
