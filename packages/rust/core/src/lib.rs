//! Merge, normalization and dedup engine for SiteFilter.
//!
//! This crate provides:
//! - [`normalize`] — raw URL-like strings to canonical domain keys
//! - [`source`] — curated list file reader
//! - [`cache`] — concurrent cache builder and cache loader
//! - [`merge`] — the run-once merge of harvested candidates into the registry

pub mod cache;
pub mod merge;
pub mod normalize;
pub mod source;

pub use cache::{DomainCache, build_cache, cache_exists, load_cache};
pub use merge::{
    MergeReport, MergeReporter, SilentReporter, Verdict, classify, eligible_candidates,
    rebuild_cache, run_merge,
};
pub use normalize::normalize;
pub use source::{SourceFragment, parse_source, read_source};
