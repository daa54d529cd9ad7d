use {
    async_trait::async_trait,
    serde::{Deserialize, Deserializer, Serialize},
    tokio::sync::mpsc,
};

// ── Events ───────────────────────────────────────────────────────────────────

/// Lifecycle notification pushed by the engine.
///
/// Events are delivered one at a time, in the order the engine emitted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Login challenge; must reach an operator for scanning.
    Qr(String),
    /// Credential exchange succeeded and was persisted.
    Authenticated,
    /// Transport fully operational.
    Ready,
    AuthFailure(String),
    Disconnected(String),
}

impl SessionEvent {
    /// Wire name of the event (`qr`, `auth_failure`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr(_) => "qr",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::AuthFailure(_) => "auth_failure",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

// ── Chat records ─────────────────────────────────────────────────────────────

/// Engine chat identifier. Opaque; only the serialized form is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatId {
    #[serde(rename = "_serialized")]
    pub serialized: String,
}

impl ChatId {
    pub fn new(serialized: impl Into<String>) -> Self {
        Self {
            serialized: serialized.into(),
        }
    }
}

/// One entry of the engine's chat list, with the engine's field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(rename = "isGroup", default)]
    pub is_group: bool,
    #[serde(default)]
    pub id: ChatId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

impl ChatRecord {
    pub fn group(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_group: true,
            id: ChatId::new(id),
            name: name.into(),
        }
    }

    pub fn direct(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_group: false,
            id: ChatId::new(id),
            name: name.into(),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not running")]
    NotRunning,

    #[error("engine transport error: {0}")]
    Transport(String),

    /// The engine refused the call; carries the engine's own message.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid engine response: {0}")]
    Protocol(String),
}

// ── Capability ───────────────────────────────────────────────────────────────

/// What the gateway consumes from the chat-automation engine.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &str;

    /// Start the engine. Lifecycle events are pushed into `events` for as
    /// long as the engine runs, including after this call returns.
    async fn initialize(
        &self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), EngineError>;

    /// Send a text message to the chat identified by `chat_id`.
    async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), EngineError>;

    /// Fetch the full chat list, in engine order.
    async fn get_chats(&self) -> Result<Vec<ChatRecord>, EngineError>;

    /// Stop the engine. Default: nothing to release.
    async fn shutdown(&self) {}
}
