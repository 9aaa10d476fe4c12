//! Conversation buffer
//!
//! Session-aware front of the [`SessionStore`]: resolves the session to use,
//! classifies turns by role, and prepends caller supplied context on read.
//! Without a bound store every operation is a silent no-op, so a memory
//! component with missing credentials degrades to "no memory".

use serde::Serialize;
use tracing::{debug, warn};

use crate::Result;
use crate::config::MemoryConfig;
use crate::connection::ConnectionRegistry;
use crate::message::{ChatTurn, Message, StoredMessage, TurnKind};
use crate::session::SessionStore;

/// Shape of the history returned by [`ConversationBuffer::get_messages`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// [`Message`] values with role and content accessors
    #[default]
    Rich,
    /// [`ChatTurn`] values (`{ text, type }`)
    Transport,
}

/// History in the requested [`MessageFormat`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum History {
    Rich(Vec<Message>),
    Transport(Vec<ChatTurn>),
}

impl History {
    fn empty(format: MessageFormat) -> Self {
        match format {
            MessageFormat::Rich => History::Rich(Vec::new()),
            MessageFormat::Transport => History::Transport(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            History::Rich(messages) => messages.len(),
            History::Transport(turns) => turns.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rich messages, converting transport turns when needed
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            History::Rich(messages) => messages,
            History::Transport(turns) => turns
                .into_iter()
                .map(|turn| match turn.kind {
                    TurnKind::UserMessage => Message::human(turn.text),
                    TurnKind::ApiMessage => Message::ai(turn.text),
                    TurnKind::SystemMessage | TurnKind::Other => Message::system(turn.text),
                })
                .collect(),
        }
    }
}

/// Chat history of one (default) session
pub struct ConversationBuffer {
    store: Option<SessionStore>,
    session_id: String,
    memory_key: String,
}

impl ConversationBuffer {
    /// Bind a buffer using the shared registry
    ///
    /// Without a configured endpoint the buffer is unbound. Connection
    /// failures propagate.
    pub async fn connect(registry: &ConnectionRegistry, config: &MemoryConfig) -> Result<Self> {
        let session_id = config
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let Some(endpoint) = config.endpoint() else {
            warn!("No memory endpoint configured, chat history is disabled");
            return Ok(Self::unbound(session_id).with_memory_key(&config.memory_key));
        };

        let client = registry.get_connection(endpoint).await?;
        let store = SessionStore::new(client.collection(&config.database, &config.collection))
            .with_timeout(config.operation_timeout());

        Ok(Self::new(store, session_id).with_memory_key(&config.memory_key))
    }

    pub fn new(store: SessionStore, session_id: impl Into<String>) -> Self {
        Self {
            store: Some(store),
            session_id: session_id.into(),
            memory_key: "chat_history".to_string(),
        }
    }

    /// Buffer without a store: reads are empty, writes are skipped
    pub fn unbound(session_id: impl Into<String>) -> Self {
        Self {
            store: None,
            session_id: session_id.into(),
            memory_key: "chat_history".to_string(),
        }
    }

    pub fn with_memory_key(mut self, memory_key: impl Into<String>) -> Self {
        self.memory_key = memory_key.into();
        self
    }

    pub fn is_bound(&self) -> bool {
        self.store.is_some()
    }

    /// Default session identifier
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Key the history is exposed under in prompt templates
    pub fn memory_key(&self) -> &str {
        &self.memory_key
    }

    /// Session an operation with `session_override` acts on
    ///
    /// A missing or blank override falls back to the default session.
    pub fn effective_session<'a>(&'a self, session_override: Option<&'a str>) -> &'a str {
        session_override
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(self.session_id.as_str())
    }

    /// Stored history of the effective session, with `prepend` in front
    pub async fn get_messages(
        &self,
        session_override: Option<&str>,
        format: MessageFormat,
        prepend: &[Message],
    ) -> Result<History> {
        let Some(store) = &self.store else {
            return Ok(History::empty(format));
        };
        let session_id = self.effective_session(session_override);

        let stored = store.read_all(session_id).await?;
        let messages: Vec<Message> = prepend
            .iter()
            .cloned()
            .chain(stored.into_iter().map(Message::from))
            .collect();

        Ok(match format {
            MessageFormat::Rich => History::Rich(messages),
            MessageFormat::Transport => {
                History::Transport(messages.iter().map(Message::to_turn).collect())
            }
        })
    }

    /// Persist one exchange
    ///
    /// Takes the first user turn and the first assistant turn of the batch and
    /// stores them user first, whatever their order in `turns`. Turns with any
    /// other tag are ignored.
    pub async fn add_messages(
        &self,
        turns: &[ChatTurn],
        session_override: Option<&str>,
    ) -> Result<()> {
        let Some(store) = &self.store else {
            debug!("Memory is unbound, skipping write");
            return Ok(());
        };
        let session_id = self.effective_session(session_override);

        let first = move |kind: TurnKind| turns.iter().find(|turn| turn.kind == kind);
        let exchange: Vec<StoredMessage> = [TurnKind::UserMessage, TurnKind::ApiMessage]
            .into_iter()
            .filter_map(first)
            .filter_map(ChatTurn::to_stored)
            .collect();

        for message in &exchange {
            store.append(session_id, message).await?;
        }
        Ok(())
    }

    /// Delete the effective session's record
    pub async fn clear_messages(&self, session_override: Option<&str>) -> Result<()> {
        let Some(store) = &self.store else {
            debug!("Memory is unbound, skipping clear");
            return Ok(());
        };
        store.clear(self.effective_session(session_override)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::backend::MemoryDriver;
    use crate::config::{BackoffConfig, Config};
    use crate::connection::BackoffConnector;
    use crate::message::Role;
    use std::sync::Arc;

    const ENDPOINT: &str = "memory://buffer";

    fn config(session_id: &str) -> MemoryConfig {
        MemoryConfig {
            endpoint: Some(ENDPOINT.to_string()),
            session_id: Some(session_id.to_string()),
            ..MemoryConfig::default()
        }
    }

    fn registry(driver: Arc<MemoryDriver>) -> ConnectionRegistry {
        let policy = BackoffConfig {
            retries: 0,
            min_delay_ms: 0,
            max_delay_ms: 0,
        };
        ConnectionRegistry::new(BackoffConnector::new(driver, policy))
    }

    async fn buffer(driver: Arc<MemoryDriver>, session_id: &str) -> ConversationBuffer {
        ConversationBuffer::connect(&registry(driver), &config(session_id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;

        buffer
            .add_messages(&[ChatTurn::user("hi"), ChatTurn::api("hello!")], None)
            .await
            .unwrap();

        let history = buffer.get_messages(None, MessageFormat::Rich, &[]).await.unwrap();
        assert_eq!(
            history,
            History::Rich(vec![Message::human("hi"), Message::ai("hello!")])
        );
    }

    #[tokio::test]
    async fn test_user_turn_is_stored_first() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;

        buffer
            .add_messages(&[ChatTurn::api("answer"), ChatTurn::user("question")], None)
            .await
            .unwrap();

        let messages = buffer
            .get_messages(None, MessageFormat::Rich, &[])
            .await
            .unwrap()
            .into_messages();
        assert_eq!(messages[0].role(), Role::Human);
        assert_eq!(messages[0].content(), "question");
        assert_eq!(messages[1].role(), Role::Ai);
        assert_eq!(messages[1].content(), "answer");
    }

    #[tokio::test]
    async fn test_batch_keeps_first_of_each_role_and_ignores_other_tags() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;

        let system = ChatTurn {
            text: "be brief".to_string(),
            kind: TurnKind::SystemMessage,
        };
        let unknown = ChatTurn {
            text: "??".to_string(),
            kind: TurnKind::Other,
        };
        buffer
            .add_messages(
                &[
                    system,
                    ChatTurn::user("first"),
                    unknown,
                    ChatTurn::user("second"),
                    ChatTurn::api("reply"),
                ],
                None,
            )
            .await
            .unwrap();

        let history = buffer
            .get_messages(None, MessageFormat::Transport, &[])
            .await
            .unwrap();
        assert_eq!(
            history,
            History::Transport(vec![ChatTurn::user("first"), ChatTurn::api("reply")])
        );
    }

    #[tokio::test]
    async fn test_single_role_batch() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;

        buffer.add_messages(&[ChatTurn::api("only me")], None).await.unwrap();
        buffer.add_messages(&[], None).await.unwrap();

        let history = buffer.get_messages(None, MessageFormat::Rich, &[]).await.unwrap();
        assert_eq!(history, History::Rich(vec![Message::ai("only me")]));
    }

    #[tokio::test]
    async fn test_prepend_comes_before_stored_history() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;
        buffer
            .add_messages(&[ChatTurn::user("hi"), ChatTurn::api("hello!")], None)
            .await
            .unwrap();

        let context = Message::system("You are a helpful assistant");
        let history = buffer
            .get_messages(None, MessageFormat::Rich, std::slice::from_ref(&context))
            .await
            .unwrap();

        assert_eq!(
            history,
            History::Rich(vec![context, Message::human("hi"), Message::ai("hello!")])
        );
    }

    #[tokio::test]
    async fn test_transport_format() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;
        buffer
            .add_messages(&[ChatTurn::user("hi"), ChatTurn::api("hello!")], None)
            .await
            .unwrap();

        let history = buffer
            .get_messages(None, MessageFormat::Transport, &[Message::system("ctx")])
            .await
            .unwrap();
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "text": "ctx", "type": "systemMessage" },
                { "text": "hi", "type": "userMessage" },
                { "text": "hello!", "type": "apiMessage" },
            ])
        );
    }

    #[tokio::test]
    async fn test_session_override() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver.clone(), "default").await;

        buffer
            .add_messages(&[ChatTurn::user("elsewhere")], Some("other"))
            .await
            .unwrap();
        buffer.add_messages(&[ChatTurn::user("here")], Some("")).await.unwrap();

        let other = buffer
            .get_messages(Some("other"), MessageFormat::Rich, &[])
            .await
            .unwrap();
        assert_eq!(other, History::Rich(vec![Message::human("elsewhere")]));

        let default = buffer.get_messages(None, MessageFormat::Rich, &[]).await.unwrap();
        assert_eq!(default, History::Rich(vec![Message::human("here")]));

        buffer.clear_messages(Some("other")).await.unwrap();
        assert!(driver.document(ENDPOINT, "chat_memory", "chat_history", "other").is_none());
        assert!(driver.document(ENDPOINT, "chat_memory", "chat_history", "default").is_some());
    }

    #[test]
    fn test_effective_session() {
        let buffer = ConversationBuffer::unbound("default");
        assert_eq!(buffer.effective_session(None), "default");
        assert_eq!(buffer.effective_session(Some("")), "default");
        assert_eq!(buffer.effective_session(Some("  ")), "default");
        assert_eq!(buffer.effective_session(Some("other")), "other");
    }

    #[tokio::test]
    async fn test_clear_messages_twice() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver, "s1").await;
        buffer.add_messages(&[ChatTurn::user("hi")], None).await.unwrap();

        buffer.clear_messages(None).await.unwrap();
        buffer.clear_messages(None).await.unwrap();
        assert!(buffer
            .get_messages(None, MessageFormat::Rich, &[])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unbound_buffer_is_a_no_op() {
        let driver = Arc::new(MemoryDriver::new());
        let registry = registry(driver.clone());

        let buffer = ConversationBuffer::connect(&registry, &MemoryConfig::default())
            .await
            .unwrap();
        assert!(!buffer.is_bound());

        let history = buffer
            .get_messages(None, MessageFormat::Rich, &[Message::system("ctx")])
            .await
            .unwrap();
        assert!(history.is_empty());
        buffer
            .add_messages(&[ChatTurn::user("hi"), ChatTurn::api("hello!")], None)
            .await
            .unwrap();
        buffer.clear_messages(None).await.unwrap();

        assert_eq!(driver.open_count(), 0);
        assert!(registry.current_endpoint().await.is_none());
    }

    #[tokio::test]
    async fn test_generated_session_id_and_memory_key() {
        let driver = Arc::new(MemoryDriver::new());
        let mut config = Config::default().memory;
        config.endpoint = Some(ENDPOINT.to_string());
        config.memory_key = "history".to_string();

        let buffer = ConversationBuffer::connect(&registry(driver), &config).await.unwrap();
        assert!(buffer.is_bound());
        assert_eq!(buffer.memory_key(), "history");
        assert!(uuid::Uuid::parse_str(buffer.session_id()).is_ok());
    }

    #[tokio::test]
    async fn test_connection_failure_propagates() {
        let driver = Arc::new(MemoryDriver::new());
        driver.set_reachable(ENDPOINT, false);

        let result = ConversationBuffer::connect(&registry(driver), &config("s1")).await;
        assert!(matches!(result, Err(Error::ConnectionExhausted { .. })));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let driver = Arc::new(MemoryDriver::new());
        let buffer = buffer(driver.clone(), "s1").await;
        driver.sever(ENDPOINT);

        assert!(matches!(
            buffer.get_messages(None, MessageFormat::Rich, &[]).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            buffer.add_messages(&[ChatTurn::user("hi")], None).await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_history_into_messages() {
        let history = History::Transport(vec![
            ChatTurn::user("q"),
            ChatTurn::api("a"),
            ChatTurn {
                text: "s".to_string(),
                kind: TurnKind::SystemMessage,
            },
        ]);
        let messages = history.into_messages();
        let roles: Vec<Role> = messages.iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::Human, Role::Ai, Role::System]);
    }
}
