//! Shared types, error model, and configuration for the harvester.
//!
//! This crate is the foundation depended on by all other harvester crates.
//! It provides:
//! - [`HarvesterError`]: the unified error type
//! - Domain types ([`SemanticAssetType`], [`SemanticAssetPath`], [`DataRow`],
//!   [`SemanticAssetMetadata`], [`NodeSummary`])
//! - Configuration ([`AppConfig`], [`TripleStoreConfig`], [`DiscoveryConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiscoveryConfig, DiscoverySection, GitSection, IndexSection, RepositoryEntry,
    TripleStoreConfig, TripleStoreSection, VocabularySection, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, validate_triple_store,
};
pub use error::{HarvesterError, Result};
pub use types::{
    DataRow, NodeSummary, SemanticAssetMetadata, SemanticAssetPath, SemanticAssetType,
};
