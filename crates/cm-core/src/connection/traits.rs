//! Driver trait definitions
//!
//! The seam between the memory core and a concrete document database.
//! A [`Driver`] opens connections, a [`DatabaseClient`] is one live
//! connection, and a [`SessionCollection`] is a collection of session
//! documents reachable through that connection.

use async_trait::async_trait;
use mongodb::bson::Document;
use std::sync::Arc;

use crate::Result;

/// Opens connections to an endpoint
///
/// Implementations make exactly one attempt per call. Retrying is the job
/// of [`BackoffConnector`](super::BackoffConnector).
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name, used for logging
    fn name(&self) -> &str;

    /// Open a connection and verify the endpoint answers
    ///
    /// # Errors
    /// `Error::Connect` when the endpoint is unreachable or rejects the connection.
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn DatabaseClient>>;
}

/// One live database connection
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Endpoint this connection was opened against
    fn endpoint(&self) -> &str;

    /// Cheap transport-level health check, no data operation involved
    async fn is_connected(&self) -> bool;

    /// Close the connection; further operations through it fail
    async fn close(&self);

    /// Handle to a collection of session documents
    fn collection(&self, database: &str, collection: &str) -> Arc<dyn SessionCollection>;
}

/// A collection holding one document per session
///
/// Documents have the layout
/// `{ sessionId: <string>, messages: [ { role, content, ... } ] }`.
#[async_trait]
pub trait SessionCollection: Send + Sync {
    /// Fetch the raw session document, `None` when it does not exist
    async fn find_session(&self, session_id: &str) -> Result<Option<Document>>;

    /// Atomically append `message` to the session's `messages` array,
    /// creating the document when it is absent
    async fn push_message(&self, session_id: &str, message: Document) -> Result<()>;

    /// Delete the session document. Deleting an absent session succeeds.
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}
