//! Analysis configuration — per-stage sections with validated tunables.
//!
//! Each pipeline stage has its own section: request bounds, clustering,
//! synthesis, cache. Loaded from a TOML file when present, otherwise
//! defaults. Invalid tunables fail `validate()` before any request runs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::*;
use crate::{AnalysisError, AnalysisResult};

/// Distance metric for the cluster engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

/// Which generative backend synthesizes topics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Spawn the `claude` CLI (no credentials handled here).
    #[default]
    Cli,
    /// OpenAI-compatible chat-completions endpoint.
    Http,
}

/// Request validation bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Default analysis window when the caller gives none.
    pub default_period_days: i64,
    pub min_period_days: i64,
    pub max_period_days: i64,
    /// Below this surviving-message count the run fails rather than
    /// returning degenerate output.
    pub min_messages: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_period_days: DEFAULT_PERIOD_DAYS,
            min_period_days: MIN_PERIOD_DAYS,
            max_period_days: MAX_PERIOD_DAYS,
            min_messages: MIN_MESSAGES,
        }
    }
}

/// Cluster engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Minimum members for a cluster; smaller groups are noise.
    pub min_cluster_size: usize,
    /// Neighbors required for a point to count as dense.
    pub min_samples: usize,
    pub metric: DistanceMetric,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: MIN_CLUSTER_SIZE,
            min_samples: MIN_SAMPLES,
            metric: DistanceMetric::Cosine,
        }
    }
}

/// Topic synthesizer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub provider: LlmProvider,
    /// CLI model flag (claude tiers) or HTTP model id.
    pub model: String,
    /// Endpoint for the HTTP provider; ignored for CLI.
    pub endpoint: Option<String>,
    /// Target language for titles and descriptions.
    pub language: String,
    /// Representative messages per cluster included in the prompt.
    pub max_representatives: usize,
    /// Concurrent synthesis calls across clusters.
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Cli,
            model: "haiku".to_string(),
            endpoint: None,
            language: "ru".to_string(),
            max_representatives: MAX_REPRESENTATIVES,
            concurrency: SYNTHESIS_CONCURRENCY,
            timeout_secs: LLM_TIMEOUT_SECS,
        }
    }
}

/// Final topic-list bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub min_topics: usize,
    pub max_topics: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_topics: MIN_TOPICS,
            max_topics: MAX_TOPICS,
        }
    }
}

/// Result cache tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_hours: i64,
    /// `cleanup` removes entries older than this, expired or not.
    pub retention_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_hours: CACHE_TTL_HOURS,
            retention_days: CACHE_RETENTION_DAYS,
        }
    }
}

/// Root configuration for the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub request: RequestConfig,
    pub clustering: ClusteringConfig,
    pub synthesis: SynthesisConfig,
    pub selection: SelectionConfig,
    pub cache: CacheConfig,
}

impl AnalysisConfig {
    /// Load from a TOML file; missing file means defaults.
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file absent, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| AnalysisError::ConfigurationError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid tunables before any request runs.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.clustering.min_cluster_size < 2 {
            return Err(AnalysisError::ConfigurationError(format!(
                "clustering.min_cluster_size must be >= 2, got {}",
                self.clustering.min_cluster_size
            )));
        }
        if self.clustering.min_samples < 1 {
            return Err(AnalysisError::ConfigurationError(
                "clustering.min_samples must be >= 1".to_string(),
            ));
        }
        if self.clustering.min_samples > self.clustering.min_cluster_size {
            return Err(AnalysisError::ConfigurationError(format!(
                "clustering.min_samples ({}) must be <= min_cluster_size ({})",
                self.clustering.min_samples, self.clustering.min_cluster_size
            )));
        }
        if self.request.min_period_days < 1
            || self.request.max_period_days < self.request.min_period_days
        {
            return Err(AnalysisError::ConfigurationError(format!(
                "request period bounds invalid: [{}, {}]",
                self.request.min_period_days, self.request.max_period_days
            )));
        }
        if self.selection.min_topics == 0 || self.selection.max_topics < self.selection.min_topics {
            return Err(AnalysisError::ConfigurationError(format!(
                "selection bounds invalid: [{}, {}]",
                self.selection.min_topics, self.selection.max_topics
            )));
        }
        if self.synthesis.concurrency == 0 {
            return Err(AnalysisError::ConfigurationError(
                "synthesis.concurrency must be >= 1".to_string(),
            ));
        }
        if self.synthesis.max_representatives == 0 {
            return Err(AnalysisError::ConfigurationError(
                "synthesis.max_representatives must be >= 1".to_string(),
            ));
        }
        if self.cache.ttl_hours < 0 || self.cache.retention_days < 0 {
            return Err(AnalysisError::ConfigurationError(
                "cache ttl/retention must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
