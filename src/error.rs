use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Requested period outside the configured bounds.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Insufficient messages: {got} surviving, {required} required")]
    InsufficientMessages { got: usize, required: usize },

    /// Clustering produced zero non-noise clusters.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Embedding backend cannot be reached or loaded.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Embedding batch was empty (caller must filter beforehand).
    #[error("Empty embedding batch")]
    EmptyBatch,

    /// Generative backend unreachable — fatal for the request.
    #[error("LLM backend unavailable: {0}")]
    LlmUnavailable(String),

    /// Per-cluster synthesis failure after retry — non-fatal, cluster skipped.
    #[error("Synthesis dropped for cluster {cluster_id}: {reason}")]
    SynthesisDropped { cluster_id: usize, reason: String },

    /// Cache store unreachable — treated as a miss by the orchestrator.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Another analysis for the same chat is already running.
    #[error("Analysis already in progress for chat {0}")]
    AnalysisInProgress(i64),

    /// Invalid tunables — fatal at startup of a run, not per-request.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Request cancelled between stages.
    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raw database errors from rusqlite
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Date parse errors from chrono
    #[error("Date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),
}

impl AnalysisError {
    /// Short machine-readable tag for logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPeriod(_) => "invalid_period",
            Self::InsufficientMessages { .. } => "insufficient_messages",
            Self::InsufficientData(_) => "insufficient_data",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::EmptyBatch => "empty_batch",
            Self::LlmUnavailable(_) => "llm_unavailable",
            Self::SynthesisDropped { .. } => "synthesis_dropped",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::AnalysisInProgress(_) => "analysis_in_progress",
            Self::ConfigurationError(_) => "configuration_error",
            Self::Cancelled => "cancelled",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Database(_) => "database",
            Self::DateParse(_) => "date_parse",
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
