//! Feedloop Storage - read access to feedback threads and reference documents
//!
//! The relay only reads from the datastore. Two implementations of
//! [`FeedbackStore`] are provided:
//! - [`RestFeedbackStore`]: the hosted Postgres REST gateway (tables plus a
//!   `match_documents` similarity RPC)
//! - [`InMemoryFeedbackStore`]: process-local data for tests and local runs

pub mod error;
pub mod memory;
pub mod models;
pub mod rest;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryFeedbackStore;
pub use models::{DocumentChunk, FeedbackThread, Reply, SenderKind};
pub use rest::{RestFeedbackStore, RestStoreConfig};
pub use store::FeedbackStore;
