//! Core data structures shared by the indexer crates: source metadata,
//! search documents, results, notifications and commands.

pub mod commands;
pub mod documents;
pub mod index_result;
pub mod metadata;
pub mod notification;
