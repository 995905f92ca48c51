//! Per-chat in-flight guard — at most one running analysis per chat.
//!
//! Explicit registry with scoped RAII acquisition rather than ambient
//! globals: the guard is taken when a run enters `Fetching` and released on
//! any terminal transition, including cancellation and panic unwinds.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::{AnalysisError, AnalysisResult};

#[derive(Debug, Default, Clone)]
pub struct InFlightRegistry {
    chats: Arc<Mutex<HashSet<i64>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the chat. A second concurrent request for the same chat
    /// is rejected with `AnalysisInProgress`, never run twice.
    pub fn acquire(&self, chat_id: i64) -> AnalysisResult<InFlightGuard> {
        let mut chats = self.chats.lock().unwrap_or_else(|p| p.into_inner());
        if !chats.insert(chat_id) {
            tracing::debug!(chat_id, "Analysis already in flight");
            return Err(AnalysisError::AnalysisInProgress(chat_id));
        }
        Ok(InFlightGuard {
            registry: self.clone(),
            chat_id,
        })
    }

    pub fn is_in_flight(&self, chat_id: i64) -> bool {
        self.chats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&chat_id)
    }

    fn release(&self, chat_id: i64) {
        self.chats
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&chat_id);
    }
}

/// RAII claim on a chat; dropping it releases the slot.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    chat_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(self.chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected() {
        let registry = InFlightRegistry::new();
        let _guard = registry.acquire(42).unwrap();
        let err = registry.acquire(42).unwrap_err();
        assert!(matches!(err, AnalysisError::AnalysisInProgress(42)));
    }

    #[test]
    fn test_different_chats_independent() {
        let registry = InFlightRegistry::new();
        let _a = registry.acquire(1).unwrap();
        let _b = registry.acquire(2).unwrap();
        assert!(registry.is_in_flight(1));
        assert!(registry.is_in_flight(2));
    }

    #[test]
    fn test_drop_releases() {
        let registry = InFlightRegistry::new();
        {
            let _guard = registry.acquire(7).unwrap();
            assert!(registry.is_in_flight(7));
        }
        assert!(!registry.is_in_flight(7));
        assert!(registry.acquire(7).is_ok());
    }
}
