//! Purpose: Define the database collaborator the loader talks to.
//! Exports: `Connector`, `Connection`.
//! Role: Seam between the pipeline and a concrete store (MongoDB, in-memory).
//! Invariants: One `Connection` per load; it is dropped when the load ends.
//! Invariants: Implementations own auth, pooling, and network retries.
use async_trait::async_trait;
use bson::Document;

use crate::core::error::Error;

/// Opens connections to a document store endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Fails with `ErrorKind::Connection` when the endpoint is unreachable.
    async fn connect(&self, endpoint: &str) -> Result<Self::Connection, Error>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    /// Insert a single new document. Rejections surface as `ErrorKind::Insert`.
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), Error>;
}
