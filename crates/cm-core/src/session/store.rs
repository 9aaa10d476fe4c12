//! Session persistence over a document collection
//!
//! A stateless accessor: every call goes to the database, nothing is cached.

use mongodb::bson;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::connection::SessionCollection;
use crate::deadline::with_deadline;
use crate::message::StoredMessage;
use crate::session::SessionRecord;
use crate::{Error, Result};

/// Read, append and clear session histories in one collection
#[derive(Clone)]
pub struct SessionStore {
    collection: Arc<dyn SessionCollection>,
    timeout: Option<Duration>,
}

impl SessionStore {
    pub fn new(collection: Arc<dyn SessionCollection>) -> Self {
        Self {
            collection,
            timeout: None,
        }
    }

    /// Bound every round trip, `None` for no deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// All messages of a session in append order
    ///
    /// An absent record (or collection) reads as an empty history.
    pub async fn read_all(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let document = with_deadline(
            self.timeout,
            "read",
            self.collection.find_session(session_id),
        )
        .await?;

        let messages = match document {
            Some(document) => SessionRecord::decode(session_id, document)?.messages,
            None => Vec::new(),
        };

        debug!(session_id = session_id, count = messages.len(), "Read session history");
        Ok(messages)
    }

    /// Append one message, creating the record on first use
    ///
    /// Each call is a single atomic push; concurrent appends never lose
    /// messages.
    pub async fn append(&self, session_id: &str, message: &StoredMessage) -> Result<()> {
        let document = bson::to_document(message)
            .map_err(|e| Error::Other(format!("Failed to encode message: {}", e)))?;

        with_deadline(
            self.timeout,
            "append",
            self.collection.push_message(session_id, document),
        )
        .await?;

        debug!(session_id = session_id, role = ?message.role, "Appended message");
        Ok(())
    }

    /// Delete the whole record. Clearing an absent session is a no-op.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        with_deadline(
            self.timeout,
            "clear",
            self.collection.delete_session(session_id),
        )
        .await?;

        debug!(session_id = session_id, "Cleared session");
        Ok(())
    }
}
