//! Session record types

use mongodb::bson::{self, Document};
use serde::{Deserialize, Serialize};

use crate::message::StoredMessage;
use crate::{Error, Result};

/// One persisted conversation: `{ sessionId, messages: [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Messages in append order
    pub messages: Vec<StoredMessage>,
}

impl SessionRecord {
    /// Strictly decode a raw document fetched for `session_id`
    ///
    /// Fails with `Error::MalformedRecord` when a field is missing or has the
    /// wrong shape, or when the document belongs to another session.
    pub fn decode(session_id: &str, document: Document) -> Result<Self> {
        let record: SessionRecord =
            bson::from_document(document).map_err(|e| Error::MalformedRecord {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            })?;

        if record.session_id != session_id {
            return Err(Error::MalformedRecord {
                session_id: session_id.to_string(),
                reason: format!("document is keyed by '{}'", record.session_id),
            });
        }

        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StoredRole;
    use mongodb::bson::{doc, oid::ObjectId};

    #[test]
    fn test_decode_full_record() {
        let raw = doc! {
            "_id": ObjectId::new(),
            "sessionId": "s1",
            "messages": [
                { "role": "human", "content": "hi" },
                { "role": "ai", "content": "hello!", "tokens": 3 },
            ],
        };

        let record = SessionRecord::decode("s1", raw).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.messages[0].role, StoredRole::Human);
        assert_eq!(record.messages[1].content, "hello!");
        assert_eq!(record.messages[1].extra.get_i32("tokens").unwrap(), 3);
    }

    #[test]
    fn test_decode_rejects_missing_messages() {
        let err = SessionRecord::decode("s1", doc! { "sessionId": "s1" }).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { ref session_id, .. } if session_id == "s1"));
    }

    #[test]
    fn test_decode_rejects_unknown_role() {
        let raw = doc! {
            "sessionId": "s1",
            "messages": [{ "role": "tool", "content": "x" }],
        };
        assert!(matches!(
            SessionRecord::decode("s1", raw),
            Err(Error::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_string_content() {
        let raw = doc! {
            "sessionId": "s1",
            "messages": [{ "role": "human", "content": 42 }],
        };
        assert!(SessionRecord::decode("s1", raw).is_err());
    }

    #[test]
    fn test_decode_rejects_foreign_session() {
        let raw = doc! { "sessionId": "other", "messages": [] };
        match SessionRecord::decode("s1", raw) {
            Err(Error::MalformedRecord { reason, .. }) => assert!(reason.contains("other")),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }
}
