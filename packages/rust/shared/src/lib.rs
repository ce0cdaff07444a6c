//! Shared types, error model, and configuration for macroharvest.
//!
//! This crate is the foundation depended on by all other macroharvest crates.
//! It provides:
//! - [`HarvestError`]: the unified error type
//! - Domain types ([`Candidate`], [`Batch`], [`FetchResult`], [`Note`], [`ResultMap`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_MAX_BODY_BYTES, HarvestConfig, HarvestSection, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{HarvestError, Result};
pub use types::{Batch, Candidate, FetchResult, Note, NoteKind, ResultMap};
