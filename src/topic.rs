use serde::{Deserialize, Serialize};

/// A synthesized discussion topic, traced back to exactly one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    /// Short title, non-empty, bounded in length.
    pub title: String,
    /// 1-3 sentence description.
    pub description: String,
    /// Member count of the source cluster.
    pub source_cluster_size: usize,
    /// Bounded subset of member message ids, most central first.
    pub representative_message_ids: Vec<i64>,
}
