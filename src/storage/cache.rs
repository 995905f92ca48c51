//! Result cache — topic sets keyed by (chat, period, message-set fingerprint).
//!
//! Entries are read-only after `put` and evicted on TTL expiry or explicit
//! cleanup. `get` never returns an expired entry. All failures surface as
//! `CacheUnavailable`; the orchestrator degrades them to a miss.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::fingerprint;
use crate::time_utils;
use crate::topic::Topic;
use crate::{AnalysisError, AnalysisResult};

/// One cached topic set.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub chat_id: i64,
    pub period_days: i64,
    pub fingerprint: String,
    pub topics: Vec<Topic>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Storage for cached analysis results (table in cache.db).
pub struct ResultCache;

fn entry_from_row(row: &Row) -> rusqlite::Result<CacheEntry> {
    let topics_json: String = row.get("topics")?;
    let created_str: String = row.get("created_at")?;
    let expires_str: String = row.get("expires_at")?;

    Ok(CacheEntry {
        chat_id: row.get("chat_id")?,
        period_days: row.get("period_days")?,
        fingerprint: row.get("fingerprint")?,
        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
        created_at: time_utils::from_sqlite(&created_str).unwrap_or_else(|_| Utc::now()),
        expires_at: time_utils::from_sqlite(&expires_str).unwrap_or_else(|_| Utc::now()),
    })
}

impl ResultCache {
    /// Fetch a live entry, or `None` on miss or expiry.
    pub fn get(
        conn: &Connection,
        chat_id: i64,
        period_days: i64,
        fp: &str,
    ) -> AnalysisResult<Option<CacheEntry>> {
        let key = fingerprint::cache_key(chat_id, period_days, fp);
        let now = time_utils::to_sqlite(&time_utils::now());

        let entry = conn
            .query_row(
                "SELECT * FROM analysis_cache WHERE cache_key = ?1 AND expires_at > ?2",
                params![key, now],
                entry_from_row,
            )
            .optional()
            .map_err(|e| AnalysisError::CacheUnavailable(format!("Cache get failed: {}", e)))?;

        tracing::debug!(chat_id, period_days, hit = entry.is_some(), "Cache lookup");
        Ok(entry)
    }

    /// Store a topic set. Overwrites any previous entry under the same key.
    pub fn put(
        conn: &Connection,
        chat_id: i64,
        period_days: i64,
        fp: &str,
        topics: &[Topic],
        ttl: Duration,
    ) -> AnalysisResult<()> {
        let key = fingerprint::cache_key(chat_id, period_days, fp);
        let now = time_utils::now();
        let topics_json = serde_json::to_string(topics)?;

        conn.execute(
            "INSERT OR REPLACE INTO analysis_cache
             (cache_key, chat_id, period_days, fingerprint, topics, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key,
                chat_id,
                period_days,
                fp,
                topics_json,
                time_utils::to_sqlite(&now),
                time_utils::to_sqlite(&(now + ttl)),
            ],
        )
        .map_err(|e| AnalysisError::CacheUnavailable(format!("Cache put failed: {}", e)))?;

        tracing::debug!(chat_id, period_days, topics = topics.len(), "Cache entry written");
        Ok(())
    }

    /// Remove expired entries and entries older than `older_than`.
    /// Returns the number of evicted rows.
    pub fn cleanup(conn: &Connection, older_than: Duration) -> AnalysisResult<usize> {
        let now = time_utils::now();
        let cutoff = now - older_than;

        let evicted = conn
            .execute(
                "DELETE FROM analysis_cache WHERE expires_at <= ?1 OR created_at < ?2",
                params![time_utils::to_sqlite(&now), time_utils::to_sqlite(&cutoff)],
            )
            .map_err(|e| AnalysisError::CacheUnavailable(format!("Cache cleanup failed: {}", e)))?;

        tracing::info!(evicted, "Cache cleanup complete");
        Ok(evicted)
    }

    /// (total, live) entry counts.
    pub fn stats(conn: &Connection) -> AnalysisResult<(usize, usize)> {
        let now = time_utils::to_sqlite(&time_utils::now());
        let total: usize = conn
            .query_row("SELECT COUNT(*) FROM analysis_cache", [], |row| row.get(0))
            .map_err(|e| AnalysisError::CacheUnavailable(e.to_string()))?;
        let live: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM analysis_cache WHERE expires_at > ?1",
                params![now],
                |row| row.get(0),
            )
            .map_err(|e| AnalysisError::CacheUnavailable(e.to_string()))?;
        Ok((total, live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_connection;

    fn topics() -> Vec<Topic> {
        vec![Topic {
            title: "Миграция на Rust".to_string(),
            description: "Стоит ли переписывать сервис.".to_string(),
            source_cluster_size: 12,
            representative_message_ids: vec![4, 9, 17],
        }]
    }

    fn test_conn() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_connection(&dir.path().join("cache.db")).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_roundtrip() {
        let (_dir, conn) = test_conn();
        let fp = "abcd1234abcd1234";
        ResultCache::put(&conn, 1, 7, fp, &topics(), Duration::hours(1)).unwrap();

        let entry = ResultCache::get(&conn, 1, 7, fp).unwrap().unwrap();
        assert_eq!(entry.topics, topics());
        assert_eq!(entry.chat_id, 1);
        assert_eq!(entry.fingerprint, fp);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (_dir, conn) = test_conn();
        let fp = "abcd1234abcd1234";
        ResultCache::put(&conn, 1, 7, fp, &topics(), Duration::seconds(0)).unwrap();
        assert!(ResultCache::get(&conn, 1, 7, fp).unwrap().is_none());
    }

    #[test]
    fn test_changed_fingerprint_misses() {
        let (_dir, conn) = test_conn();
        ResultCache::put(&conn, 1, 7, "fp-one", &topics(), Duration::hours(1)).unwrap();
        assert!(ResultCache::get(&conn, 1, 7, "fp-two").unwrap().is_none());
    }

    #[test]
    fn test_cleanup_evicts_expired() {
        let (_dir, conn) = test_conn();
        ResultCache::put(&conn, 1, 7, "stale", &topics(), Duration::seconds(0)).unwrap();
        ResultCache::put(&conn, 2, 7, "live", &topics(), Duration::hours(1)).unwrap();

        let evicted = ResultCache::cleanup(&conn, Duration::days(7)).unwrap();
        assert_eq!(evicted, 1);

        let (total, live) = ResultCache::stats(&conn).unwrap();
        assert_eq!(total, 1);
        assert_eq!(live, 1);
    }

    #[test]
    fn test_put_overwrites_same_key() {
        let (_dir, conn) = test_conn();
        let fp = "samekey";
        ResultCache::put(&conn, 1, 7, fp, &topics(), Duration::hours(1)).unwrap();
        let mut updated = topics();
        updated[0].title = "Новая тема".to_string();
        ResultCache::put(&conn, 1, 7, fp, &updated, Duration::hours(1)).unwrap();

        let entry = ResultCache::get(&conn, 1, 7, fp).unwrap().unwrap();
        assert_eq!(entry.topics[0].title, "Новая тема");
        let (total, _) = ResultCache::stats(&conn).unwrap();
        assert_eq!(total, 1);
    }
}
