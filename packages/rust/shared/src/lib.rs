//! Shared types, error model, and configuration for SiteFilter.
//!
//! This crate is the foundation depended on by all other SiteFilter crates.
//! It provides:
//! - [`SiteFilterError`] — the unified error type
//! - Domain types ([`RejectionPolicy`], [`RejectReason`], [`RejectedDomain`])
//! - Configuration ([`AppConfig`], [`MergeConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CachePaths, MergeConfig, MergeSettings, PathsConfig, RulesConfig, SearchConfig,
    SourcesConfig, candidates_path, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from,
};
pub use error::{Result, SiteFilterError};
pub use types::{RejectReason, RejectedDomain, RejectionPolicy};
