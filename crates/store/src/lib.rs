//! Document store gateway
//!
//! The gateway treats persistence as an opaque hierarchical key-path store:
//! documents live under slash-separated paths like
//! `users/{uid}/conversations/{cid}`, with subcollections nested one level
//! deeper. The [`DocumentStore`] trait is the seam; production talks to a
//! Firestore-style REST API, tests use the in-memory implementation.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// One stored document: its id within the collection plus its fields
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    RequestFailed(String),
    #[error("store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add a document with a generated id to the collection at `path`;
    /// returns the new id.
    async fn create(&self, path: &str, doc: Value) -> Result<String, StoreError>;

    /// Merge `doc` into the document at `path`, creating it if absent.
    /// Only the supplied fields are touched.
    async fn set_merge(&self, path: &str, doc: Value) -> Result<(), StoreError>;

    /// Documents in the collection at `path`, ordered by the given field
    async fn list(
        &self,
        path: &str,
        order_by: &str,
        descending: bool,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Delete the document at `path`; deleting a missing document is not
    /// an error.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Atomically add `by` to a numeric field of the document at `path`
    async fn increment(&self, path: &str, field: &str, by: i64) -> Result<(), StoreError>;
}
