//! # Analysis Indexer
//!
//! Indexes genomic analysis metadata published by study repositories into
//! OpenSearch, as file-centric and analysis-centric documents.
//!
//! ## Architecture
//!
//! 1. **Metadata**: fetches analyses and studies from a repository
//! 2. **Rules**: drops analyses matched by an exclusion rule
//! 3. **Converter**: turns an analysis into search documents
//! 4. **Resolver**: checks documents against what is already indexed
//! 5. **Bulk writer**: partitioned, retrying upserts (repository crate)
//! 6. **Orchestrator**: the [`Indexer`] running each command end to end
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`converter`]: Analysis to document conversion
//! - [`errors`]: Error types for the indexer
//! - [`metadata`]: Study metadata source and SONG client
//! - [`notifier`]: Notification fan-out
//! - [`orchestrator`]: The indexer façade
//! - [`registry`]: Configured repositories
//! - [`resolver`]: Merge and conflict decisions
//! - [`rules`]: Exclusion rules

pub mod config;
pub mod converter;
pub mod errors;
pub mod metadata;
pub mod notifier;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod rules;

pub use config::Dependencies;
pub use errors::IndexerError;
pub use orchestrator::Indexer;
