//! Shared types, error model, and configuration for Marginalia.
//!
//! This crate is the foundation depended on by all other Marginalia crates.
//! It provides:
//! - [`MarginaliaError`]: the unified error type
//! - Domain types ([`AnnotationRecord`], [`RawAnnotation`], [`BookIdentity`], [`LibraryBook`])
//! - Configuration ([`AppConfig`], [`CatalogSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogSettings, ExtractionConfig, HardcoverConfig, PathsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, token_from_env,
};
pub use error::{MarginaliaError, Result};
pub use types::{
    AnnotationRecord, BookIdentity, Edition, JournalEntry, JournalEvent, LibraryBook,
    NO_ISBN, NO_ISBN_FOUND, NOTE_DELIMITER, RawAnnotation, UNKNOWN_CHAPTER, is_usable_isbn,
};
