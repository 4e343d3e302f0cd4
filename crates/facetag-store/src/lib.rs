//! facetag-store: SQLite persistence for facetag.
//!
//! Implements the core's [`EmbeddingRepository`](facetag_core::EmbeddingRepository)
//! and [`PhotoLedger`](facetag_core::PhotoLedger) on top of a single database
//! file, plus the registration and reporting queries the CLI needs.

pub mod db;
pub mod error;
mod schema;

pub use db::{PersonRecord, Stats, Store, TaggedPhoto};
pub use error::StoreError;
