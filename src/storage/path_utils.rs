use std::path::PathBuf;

/// Application data directory (`~/.local/share/chat-topics` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chat-topics")
}

/// Default location of the result-cache database.
pub fn cache_db_path() -> PathBuf {
    data_dir().join("cache.db")
}

/// Default location of the configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chat-topics")
        .join("config.toml")
}
