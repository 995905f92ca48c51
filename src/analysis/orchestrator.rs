//! Analysis orchestrator — drives one request through the pipeline stages.
//!
//! `Validated -> Fetching -> Normalizing -> Embedding -> Clustering ->
//! Synthesizing -> Ranked -> Cached -> Done`, with `Failed(reason)`
//! reachable from every state. Cancellation is checked at each transition;
//! the per-chat in-flight guard is held from `Fetching` until any terminal
//! transition.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Duration;
use rayon::prelude::*;

use crate::analysis::clusterer;
use crate::analysis::guard::InFlightRegistry;
use crate::analysis::synthesizer::{self, ClusterDigest, SynthesizedTopic};
use crate::analysis::{AnalysisReport, AnalysisRequest, CancelToken, Stage};
use crate::config::AnalysisConfig;
use crate::fingerprint::message_set_fingerprint;
use crate::message::ChatMessage;
use crate::processing::embeddings::{EmbeddingBackend, EmbeddingVector};
use crate::processing::llm::LlmBackend;
use crate::processing::normalizer;
use crate::source::MessageSource;
use crate::storage::cache::ResultCache;
use crate::storage::database;
use crate::topic::Topic;
use crate::{AnalysisError, AnalysisResult};

pub struct Orchestrator {
    config: AnalysisConfig,
    source: Box<dyn MessageSource>,
    embedder: Box<dyn EmbeddingBackend>,
    llm: Box<dyn LlmBackend>,
    /// `None` disables caching entirely.
    cache_path: Option<PathBuf>,
    in_flight: InFlightRegistry,
    synthesis_pool: rayon::ThreadPool,
}

impl Orchestrator {
    /// Build an orchestrator. Invalid tunables fail here, once, rather than
    /// per-request.
    pub fn new(
        config: AnalysisConfig,
        source: Box<dyn MessageSource>,
        embedder: Box<dyn EmbeddingBackend>,
        llm: Box<dyn LlmBackend>,
    ) -> AnalysisResult<Self> {
        config.validate()?;
        let synthesis_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.synthesis.concurrency)
            .thread_name(|i| format!("synthesis-{}", i))
            .build()
            .map_err(|e| AnalysisError::ConfigurationError(format!("Synthesis pool: {}", e)))?;

        Ok(Self {
            cache_path: config.cache.enabled.then(crate::storage::path_utils::cache_db_path),
            config,
            source,
            embedder,
            llm,
            in_flight: InFlightRegistry::new(),
            synthesis_pool,
        })
    }

    /// Override the cache database location (tests, CLI flag).
    pub fn with_cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = path;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run one analysis request to completion.
    pub fn analyze(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
    ) -> AnalysisResult<AnalysisReport> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("analysis", run = %&run_id[..8], chat_id = request.chat_id);
        let _enter = span.enter();

        let result = self.run(request, cancel, started);
        match &result {
            Ok(report) => tracing::info!(
                topics = report.topics.len(),
                cached = report.cached,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Analysis complete"
            ),
            Err(e) => tracing::warn!(reason = e.kind(), "Analysis failed: {}", e),
        }
        result
    }

    fn run(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
        started: Instant,
    ) -> AnalysisResult<AnalysisReport> {
        // Validated
        self.transition(Stage::Validated, cancel)?;
        let period_days = self.validate_period(request)?;

        // Fetching — the per-chat claim is held from here to any terminal
        // transition; dropping the guard on early return releases it.
        self.transition(Stage::Fetching, cancel)?;
        let _guard = self.in_flight.acquire(request.chat_id)?;

        let until = crate::time_utils::now();
        let since = until - Duration::days(period_days);
        let mut messages = self.source.fetch_messages(request.chat_id, since, until)?;
        // Sources promise ascending order; do not rely on it.
        messages.sort_by_key(|m| (m.timestamp, m.id));
        tracing::debug!(fetched = messages.len(), period_days, "Messages fetched");

        // Normalizing
        self.transition(Stage::Normalizing, cancel)?;
        let survivors = self.normalize(messages)?;
        let analyzed = self.deduplicate(survivors);
        let message_count = analyzed.len();
        let analyzed_ids: Vec<i64> = analyzed.iter().map(|m| m.id).collect();
        let fp = message_set_fingerprint(&analyzed_ids);

        // A changed window never returns stale results: the fingerprint is
        // part of the key, so the lookup happens once the analyzed set is
        // known.
        if !request.force {
            if let Some(cached) = self.cache_get(request.chat_id, period_days, &fp) {
                return Ok(AnalysisReport {
                    chat_id: request.chat_id,
                    period_days,
                    cluster_count: cached.topics.len(),
                    topics: cached.topics,
                    message_count,
                    noise_count: 0,
                    dropped_clusters: 0,
                    below_minimum: false,
                    cached: true,
                    elapsed: started.elapsed(),
                });
            }
        }

        // Embedding
        self.transition(Stage::Embedding, cancel)?;
        let vectors = self.embed(&analyzed)?;

        // Clustering
        self.transition(Stage::Clustering, cancel)?;
        let outcome = clusterer::cluster(
            &vectors.iter().map(|v| v.vector.clone()).collect::<Vec<_>>(),
            &self.config.clustering,
        )?;
        if outcome.clusters.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "no dense clusters among {} messages",
                message_count
            )));
        }

        // Synthesizing
        self.transition(Stage::Synthesizing, cancel)?;
        let (synthesized, dropped_clusters) =
            self.synthesize_all(&analyzed, &vectors, &outcome.clusters, cancel)?;
        if cancel.is_cancelled() {
            // In-flight calls were allowed to finish; their output is discarded.
            return Err(AnalysisError::Cancelled);
        }
        if synthesized.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "all {} clusters dropped during synthesis",
                outcome.clusters.len()
            )));
        }

        // Ranked
        self.transition(Stage::Ranked, cancel)?;
        let cluster_count = outcome.clusters.len();
        let (topics, below_minimum) = self.rank(synthesized);

        // Cached
        self.transition(Stage::Cached, cancel)?;
        self.cache_put(request.chat_id, period_days, &fp, &topics);

        self.transition(Stage::Done, cancel)?;
        Ok(AnalysisReport {
            chat_id: request.chat_id,
            period_days,
            topics,
            message_count,
            cluster_count,
            noise_count: outcome.noise_count,
            dropped_clusters,
            below_minimum,
            cached: false,
            elapsed: started.elapsed(),
        })
    }

    fn transition(&self, stage: Stage, cancel: &CancelToken) -> AnalysisResult<()> {
        if cancel.is_cancelled() {
            tracing::debug!(stage = stage.as_str(), "Cancelled before stage");
            return Err(AnalysisError::Cancelled);
        }
        tracing::debug!(stage = stage.as_str(), "Stage transition");
        Ok(())
    }

    fn validate_period(&self, request: &AnalysisRequest) -> AnalysisResult<i64> {
        let bounds = &self.config.request;
        let days = request.period_days.unwrap_or(bounds.default_period_days);
        if days < bounds.min_period_days || days > bounds.max_period_days {
            return Err(AnalysisError::InvalidPeriod(format!(
                "{}d outside [{}d, {}d]",
                days, bounds.min_period_days, bounds.max_period_days
            )));
        }
        Ok(days)
    }

    /// Fill `normalized_text`, keep only messages with analyzable content,
    /// and enforce the minimum-message floor.
    fn normalize(&self, messages: Vec<ChatMessage>) -> AnalysisResult<Vec<ChatMessage>> {
        let survivors: Vec<ChatMessage> = messages
            .into_iter()
            .filter_map(|mut m| {
                m.normalized_text = normalizer::normalize(&m.raw_text);
                m.has_content().then_some(m)
            })
            .collect();

        let required = self.config.request.min_messages;
        if survivors.len() < required {
            return Err(AnalysisError::InsufficientMessages {
                got: survivors.len(),
                required,
            });
        }
        tracing::debug!(surviving = survivors.len(), "Normalization complete");
        Ok(survivors)
    }

    /// Near-duplicate suppression over normalized texts, first wins.
    fn deduplicate(&self, survivors: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let texts: Vec<&str> = survivors
            .iter()
            .map(|m| m.normalized_text.as_deref().unwrap_or_default())
            .collect();
        let kept = normalizer::dedup_indices(&texts);
        if kept.len() < survivors.len() {
            tracing::debug!(
                dropped = survivors.len() - kept.len(),
                "Near-duplicates suppressed"
            );
        }
        let keep: std::collections::HashSet<usize> = kept.into_iter().collect();
        survivors
            .into_iter()
            .enumerate()
            .filter_map(|(i, m)| keep.contains(&i).then_some(m))
            .collect()
    }

    fn embed(&self, analyzed: &[ChatMessage]) -> AnalysisResult<Vec<EmbeddingVector>> {
        let texts: Vec<&str> = analyzed
            .iter()
            .map(|m| m.normalized_text.as_deref().unwrap_or_default())
            .collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        let model_version = self.embedder.model_version().to_string();
        Ok(analyzed
            .iter()
            .zip(vectors)
            .map(|(m, vector)| EmbeddingVector {
                message_id: m.id,
                vector,
                model_version: model_version.clone(),
            })
            .collect())
    }

    /// Synthesize all clusters on the bounded pool. Per-cluster drops are
    /// absorbed; backend unavailability aborts. Cancellation stops issuing
    /// new calls but lets in-flight ones complete.
    fn synthesize_all(
        &self,
        analyzed: &[ChatMessage],
        vectors: &[EmbeddingVector],
        clusters: &[clusterer::Cluster],
        cancel: &CancelToken,
    ) -> AnalysisResult<(Vec<SynthesizedTopic>, usize)> {
        let digests: Vec<ClusterDigest> = clusters
            .iter()
            .map(|c| {
                let members: Vec<(&ChatMessage, &[f32])> = c
                    .member_indices
                    .iter()
                    .map(|&i| (&analyzed[i], vectors[i].vector.as_slice()))
                    .collect();
                ClusterDigest::build(c.cluster_id, &members, self.config.synthesis.max_representatives)
            })
            .collect();

        let results: Vec<Option<AnalysisResult<SynthesizedTopic>>> = self.synthesis_pool.install(|| {
            digests
                .par_iter()
                .map(|digest| {
                    if cancel.is_cancelled() {
                        return None; // stop issuing new calls
                    }
                    Some(synthesizer::synthesize(
                        self.llm.as_ref(),
                        digest,
                        &self.config.synthesis,
                    ))
                })
                .collect()
        });

        let mut synthesized = Vec::new();
        let mut dropped = 0usize;
        for result in results.into_iter().flatten() {
            match result {
                Ok(topic) => synthesized.push(topic),
                Err(AnalysisError::SynthesisDropped { cluster_id, reason }) => {
                    tracing::warn!(cluster = cluster_id, reason = %reason, "Cluster dropped");
                    dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((synthesized, dropped))
    }

    /// Rank by cluster size descending, ties by earliest representative
    /// timestamp, then clamp to the configured maximum. A short list is
    /// returned as-is and flagged, never silently.
    fn rank(&self, mut synthesized: Vec<SynthesizedTopic>) -> (Vec<Topic>, bool) {
        synthesized.sort_by(|a, b| {
            b.topic
                .source_cluster_size
                .cmp(&a.topic.source_cluster_size)
                .then(a.earliest_representative.cmp(&b.earliest_representative))
        });

        let max = self.config.selection.max_topics;
        if synthesized.len() > max {
            tracing::debug!(total = synthesized.len(), max, "Truncating topic list");
            synthesized.truncate(max);
        }

        let below_minimum = synthesized.len() < self.config.selection.min_topics;
        let topics = synthesized.into_iter().map(|s| s.topic).collect();
        (topics, below_minimum)
    }

    /// Cache read, degraded to a miss when the store is unavailable.
    fn cache_get(
        &self,
        chat_id: i64,
        period_days: i64,
        fp: &str,
    ) -> Option<crate::storage::cache::CacheEntry> {
        let path = self.cache_path.as_ref()?;
        let lookup = database::open_connection(path)
            .and_then(|conn| ResultCache::get(&conn, chat_id, period_days, fp));
        match lookup {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Cache unavailable, proceeding with full computation");
                None
            }
        }
    }

    /// Cache write; failures are logged, never fatal.
    fn cache_put(&self, chat_id: i64, period_days: i64, fp: &str, topics: &[Topic]) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };
        let ttl = Duration::hours(self.config.cache.ttl_hours);
        let write = database::open_connection(path)
            .and_then(|conn| ResultCache::put(&conn, chat_id, period_days, fp, topics, ttl));
        if let Err(e) = write {
            tracing::warn!(error = %e, "Cache write failed, result returned uncached");
        }
    }
}
