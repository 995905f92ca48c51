// === Request Validation ===
pub const DEFAULT_PERIOD_DAYS: i64 = 7;
pub const MIN_PERIOD_DAYS: i64 = 1;
pub const MAX_PERIOD_DAYS: i64 = 14;
pub const MIN_MESSAGES: usize = 50;

// === Normalization ===
pub const MIN_NORMALIZED_CHARS: usize = 10;
pub const MIN_NORMALIZED_WORDS: usize = 3;
pub const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.7;

// === Embeddings ===
pub const EMBEDDING_DIM: usize = 384;
pub const EMBEDDING_MODEL_VERSION: &str = "tfidf-hash-384/1";

// === Clustering ===
pub const MIN_CLUSTER_SIZE: usize = 8;
pub const MIN_SAMPLES: usize = 2;
/// Quantile of the core-distance distribution used to derive the density scale.
pub const CORE_DISTANCE_QUANTILE: f64 = 0.25;
/// Multiplier applied to the quantile core distance to obtain the reach radius.
pub const REACH_SCALE: f64 = 2.0;

// === Synthesis ===
pub const MAX_REPRESENTATIVES: usize = 5;
pub const TITLE_MAX_CHARS: usize = 60;
pub const DESCRIPTION_MAX_CHARS: usize = 300;
pub const SYNTHESIS_CONCURRENCY: usize = 4;
pub const LLM_TIMEOUT_SECS: u64 = 30;
/// One retry with a stricter prompt before the cluster is dropped.
pub const SYNTHESIS_MAX_RETRIES: u32 = 1;

// === Topic Selection ===
pub const MIN_TOPICS: usize = 3;
pub const MAX_TOPICS: usize = 7;

// === Result Cache ===
pub const CACHE_TTL_HOURS: i64 = 24;
pub const CACHE_RETENTION_DAYS: i64 = 7;
pub const FINGERPRINT_LEN: usize = 16;

// === SQLite Tuning ===
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Truncate a string on a char boundary, appending "..." when shortened.
pub fn truncate_safe(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_short_input_untouched() {
        assert_eq!(truncate_safe("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_safe_multibyte() {
        let s = "привет мир привет мир";
        let t = truncate_safe(s, 10);
        assert!(t.ends_with("..."));
        assert!(t.chars().count() <= 10);
    }
}
