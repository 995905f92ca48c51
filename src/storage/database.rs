use crate::constants::SQLITE_BUSY_TIMEOUT_MS;
use crate::{AnalysisError, AnalysisResult};
use rusqlite::Connection;

/// Open a SQLite connection with the cache schema applied.
///
/// WAL keeps `cleanup` safe against concurrent readers: a reader sees the
/// old row or a miss, never a partial entry.
pub fn open_connection(path: &std::path::Path) -> AnalysisResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)
        .map_err(|e| AnalysisError::CacheUnavailable(format!("Failed to open {}: {}", path.display(), e)))?;

    tracing::debug!(path = %path.display(), "Database connection opened");

    configure(&conn)?;
    migrate(&conn)?;

    Ok(conn)
}

/// Pragmas shared by every connection:
/// - journal_mode = WAL
/// - busy_timeout = SQLITE_BUSY_TIMEOUT_MS (constants.rs)
/// - synchronous = NORMAL
/// - temp_store = MEMORY
fn configure(conn: &Connection) -> AnalysisResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = {};
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;",
        SQLITE_BUSY_TIMEOUT_MS,
    ))
    .map_err(|e| AnalysisError::CacheUnavailable(format!("Failed to configure pragmas: {}", e)))?;
    Ok(())
}

fn migrate(conn: &Connection) -> AnalysisResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS analysis_cache (
            cache_key    TEXT PRIMARY KEY,
            chat_id      INTEGER NOT NULL,
            period_days  INTEGER NOT NULL,
            fingerprint  TEXT NOT NULL,
            topics       TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            expires_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_created ON analysis_cache(created_at);",
    )
    .map_err(|e| AnalysisError::CacheUnavailable(format!("Schema migration failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_db_path() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        (dir, path)
    }

    #[test]
    fn test_open_connection_smoke() {
        let (_dir, path) = tmp_db_path();
        let conn = open_connection(&path);
        assert!(conn.is_ok(), "open_connection should not error");
    }

    #[test]
    fn test_busy_timeout_set_correctly() {
        let (_dir, path) = tmp_db_path();
        let conn = open_connection(&path).unwrap();
        let timeout: u32 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, SQLITE_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn test_schema_created() {
        let (_dir, path) = tmp_db_path();
        let conn = open_connection(&path).unwrap();
        let count: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'analysis_cache'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
