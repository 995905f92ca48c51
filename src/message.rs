use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One group-chat message inside an analysis window.
///
/// Immutable once fetched; owned by the orchestrator for the duration of a
/// single run and never persisted by the core. `normalized_text` is filled
/// by the normalizer pass and stays `None` for non-content messages
/// (pure media, pure mention, empty after stripping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique within a chat.
    pub id: i64,
    pub chat_id: i64,
    pub author_id: i64,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_text: Option<String>,
}

impl ChatMessage {
    pub fn new(
        id: i64,
        chat_id: i64,
        author_id: i64,
        timestamp: DateTime<Utc>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            chat_id,
            author_id,
            timestamp,
            raw_text: raw_text.into(),
            normalized_text: None,
        }
    }

    /// True once normalization produced analyzable content.
    pub fn has_content(&self) -> bool {
        self.normalized_text.as_deref().is_some_and(|t| !t.is_empty())
    }
}
