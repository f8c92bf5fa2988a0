#![recursion_limit = "256"]
//! # Catalog Search
//!
//! Everything between a catalog event and a queryable search document:
//!
//! - [`document`]: the denormalized `ProductSearchDocument` shape, one per
//!   product, fully replaced on every re-index (never patched); that is
//!   what makes projection idempotent under at-least-once delivery
//! - [`mapper`]: the pure event → document transform
//! - [`schema`]: the index mapping and settings
//! - [`SearchClient`]: Elasticsearch-compatible REST client
//! - [`IndexManager`]: ensures the index exists with the required schema
//!   before anything is written

pub mod document;
pub mod mapper;
pub mod schema;

mod client;
mod index_manager;

pub use client::{CreateIndexOutcome, SearchClient, SearchIndexApi, SearchPage};
pub use document::ProductSearchDocument;
pub use index_manager::{IndexManager, IndexState};
pub use schema::{IndexSettings, INDEX_NAME};

/// Errors from the search engine client and index lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(String),

    #[error("search engine returned {status}: {body}")]
    Engine { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index schema could not be verified: {0}")]
    Schema(String),
}

/// Result type for search operations.
pub type SearchResult<T> = Result<T, SearchError>;
