//! Analysis pipeline — clustering, synthesis, orchestration.

pub mod clusterer;
pub mod guard;
pub mod orchestrator;
pub mod synthesizer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// One analysis request, the core's own boundary contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub chat_id: i64,
    /// Analysis window; `None` means the configured default.
    pub period_days: Option<i64>,
    /// Bypass the cache read (the result is still written).
    #[serde(default)]
    pub force: bool,
}

impl AnalysisRequest {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            period_days: None,
            force: false,
        }
    }

    pub fn with_period(mut self, days: i64) -> Self {
        self.period_days = Some(days);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Successful analysis outcome handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub chat_id: i64,
    pub period_days: i64,
    /// Ranked, deduplicated topics; never silently truncated — see
    /// `below_minimum` and `dropped_clusters`.
    pub topics: Vec<Topic>,
    /// Surviving (non-null-normalized, deduplicated) message count.
    pub message_count: usize,
    pub cluster_count: usize,
    pub noise_count: usize,
    /// Clusters dropped by synthesis failures (non-fatal).
    pub dropped_clusters: usize,
    /// True when fewer than the configured minimum topics survived.
    pub below_minimum: bool,
    pub cached: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Stages of one analysis run. Cancellation is checked cooperatively at
/// every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validated,
    Fetching,
    Normalizing,
    Embedding,
    Clustering,
    Synthesizing,
    Ranked,
    Cached,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Embedding => "embedding",
            Self::Clustering => "clustering",
            Self::Synthesizing => "synthesizing",
            Self::Ranked => "ranked",
            Self::Cached => "cached",
            Self::Done => "done",
        }
    }
}

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
