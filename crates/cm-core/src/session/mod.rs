//! Session-scoped chat history
//!
//! [`SessionStore`] reads, appends and clears the persisted records;
//! [`ConversationBuffer`] layers session resolution and role handling on top.

mod buffer;
mod store;
mod types;

pub use buffer::{ConversationBuffer, History, MessageFormat};
pub use store::SessionStore;
pub use types::SessionRecord;
