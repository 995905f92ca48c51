//! Message source boundary — where raw chat history comes from.
//!
//! The Telegram session itself lives outside this crate; the core only
//! consumes this contract. Sources may return partial history — the
//! pipeline never assumes completeness.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::message::ChatMessage;
use crate::{AnalysisError, AnalysisResult};

pub trait MessageSource: Send + Sync {
    /// Fetch messages for one chat within [since, until], ascending
    /// timestamp order.
    fn fetch_messages(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnalysisResult<Vec<ChatMessage>>;
}

impl<S: MessageSource + ?Sized> MessageSource for std::sync::Arc<S> {
    fn fetch_messages(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnalysisResult<Vec<ChatMessage>> {
        self.as_ref().fetch_messages(chat_id, since, until)
    }
}

/// Wire shape of one exported message.
#[derive(Debug, Deserialize)]
struct ExportedMessage {
    id: i64,
    chat_id: i64,
    #[serde(default)]
    author_id: i64,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    is_bot: bool,
}

/// Reads a chat-export JSON array from disk.
///
/// Service noise is filtered at this boundary: bot authors and empty-text
/// messages never enter the pipeline.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageSource for JsonFileSource {
    fn fetch_messages(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnalysisResult<Vec<ChatMessage>> {
        let raw = std::fs::read_to_string(&self.path)?;
        let exported: Vec<ExportedMessage> = serde_json::from_str(&raw)?;

        let mut messages: Vec<ChatMessage> = exported
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .filter(|m| !m.is_bot && !m.text.trim().is_empty())
            .filter(|m| m.timestamp >= since && m.timestamp <= until)
            .map(|m| ChatMessage::new(m.id, m.chat_id, m.author_id, m.timestamp, m.text))
            .collect();

        messages.sort_by_key(|m| (m.timestamp, m.id));
        tracing::debug!(
            chat_id,
            count = messages.len(),
            path = %self.path.display(),
            "Messages loaded from export"
        );
        Ok(messages)
    }
}

/// Reject exports that cannot be read up front with a clearer error.
pub fn probe_export(path: &Path) -> AnalysisResult<()> {
    if !path.exists() {
        return Err(AnalysisError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("export file not found: {}", path.display()),
        )));
    }
    Ok(())
}
