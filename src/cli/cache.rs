use anyhow::{Context, Result};
use chat_topics::constants::CACHE_RETENTION_DAYS;
use chat_topics::storage::cache::ResultCache;
use chat_topics::storage::database::open_connection;
use chat_topics::storage::path_utils;

pub fn cleanup(older_than_days: Option<i64>) -> Result<()> {
    let days = older_than_days.unwrap_or(CACHE_RETENTION_DAYS);
    let conn = open_connection(&path_utils::cache_db_path())
        .context("Failed to open cache database")?;

    let evicted = ResultCache::cleanup(&conn, chrono::Duration::days(days))
        .context("Cleanup failed")?;
    println!("Evicted {} cache entries older than {}d", evicted, days);
    Ok(())
}

pub fn stats() -> Result<()> {
    let conn = open_connection(&path_utils::cache_db_path())
        .context("Failed to open cache database")?;

    let (total, live) = ResultCache::stats(&conn).context("Stats query failed")?;
    println!("Cache entries: {} total, {} live", total, live);
    Ok(())
}
