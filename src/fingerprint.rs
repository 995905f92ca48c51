use sha2::{Digest, Sha256};

use crate::constants::FINGERPRINT_LEN;

/// Stable hash over the exact set of message ids analyzed.
///
/// Ids are sorted before hashing so the fingerprint depends only on the set,
/// not on fetch order. A changed window therefore never hits a stale entry.
pub fn message_set_fingerprint(message_ids: &[i64]) -> String {
    let mut sorted: Vec<i64> = message_ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for id in &sorted {
        hasher.update(id.to_le_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..FINGERPRINT_LEN].to_string()
}

/// Composite cache key: chat id, period, message-set fingerprint.
pub fn cache_key(chat_id: i64, period_days: i64, fingerprint: &str) -> String {
    format!("{}:{}d:{}", chat_id, period_days, fingerprint)
}
