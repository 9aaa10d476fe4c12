//! cm-core: Chat Memory Core Library
//!
//! Session-scoped chat history persisted in a document database, behind a
//! single shared connection that survives transient outages.

pub mod backend;
pub mod config;
pub mod connection;
mod deadline;
pub mod error;
pub mod message;
pub mod session;

pub use backend::{MemoryDriver, MongoDriver, driver_for};
pub use config::{BackoffConfig, Config, MemoryConfig};
pub use connection::{
    BackoffConnector, ConnectionRegistry, DatabaseClient, Driver, SessionCollection,
    redact_endpoint,
};
pub use error::{Error, Result};
pub use message::{ChatTurn, Message, Role, StoredMessage, StoredRole, TurnKind};
pub use session::{ConversationBuffer, History, MessageFormat, SessionRecord, SessionStore};
