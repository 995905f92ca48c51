//! End-to-end pipeline scenarios with scripted source and backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use chrono::{DateTime, Duration, Utc};

use chat_topics::analysis::AnalysisRequest;
use chat_topics::config::AnalysisConfig;
use chat_topics::message::ChatMessage;
use chat_topics::processing::embeddings::{EmbeddingBackend, HashEmbedder};
use chat_topics::processing::llm::LlmBackend;
use chat_topics::source::MessageSource;
use chat_topics::{AnalysisError, AnalysisResult, CancelToken, Orchestrator};

const CHAT_ID: i64 = -100500;

/// In-memory source with a fetch counter.
struct VecSource {
    messages: Vec<ChatMessage>,
    fetches: AtomicUsize,
}

impl VecSource {
    fn new(messages: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            messages,
            fetches: AtomicUsize::new(0),
        })
    }
}

impl MessageSource for VecSource {
    fn fetch_messages(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnalysisResult<Vec<ChatMessage>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.timestamp >= since && m.timestamp <= until)
            .cloned()
            .collect())
    }
}

/// Hash embedder with a call counter.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashEmbedder::new(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl EmbeddingBackend for CountingEmbedder {
    fn model_version(&self) -> &str {
        self.inner.model_version()
    }

    fn embed_batch(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

/// Prompt-aware scripted LLM: answers by topic keyword, counts calls.
struct KeywordLlm {
    calls: AtomicUsize,
}

impl KeywordLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

impl LlmBackend for KeywordLlm {
    fn generate(&self, prompt: &str) -> AnalysisResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains("postgres") {
            Ok(r#"{"title":"Postgres в проде","description":"Индексы, планы запросов и миграции."}"#.into())
        } else {
            Ok(r#"{"title":"Киновечер","description":"Что смотрим на следующей встрече."}"#.into())
        }
    }
}

fn message(id: i64, minutes_ago: i64, text: String) -> ChatMessage {
    ChatMessage::new(
        id,
        CHAT_ID,
        1000 + id % 7,
        Utc::now() - Duration::minutes(minutes_ago),
        text,
    )
}

/// 60 messages over the window: two clear semantic groups of 30.
///
/// Each message shares a four-word topical core and carries two unique
/// words, keeping in-group word overlap high for clustering but below the
/// near-duplicate threshold.
fn two_cluster_messages() -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    for i in 0..30i64 {
        messages.push(message(
            1 + i,
            9_000 - i * 10,
            format!("обсуждаем postgres индексы запросов тема{} вопрос{}", i, i),
        ));
    }
    for i in 0..30i64 {
        messages.push(message(
            31 + i,
            500 - i * 10,
            format!("смотрим кино вечером вместе фильм{} сеанс{}", i, i),
        ));
    }
    messages
}

fn build(
    source: Arc<VecSource>,
    embedder: Arc<CountingEmbedder>,
    llm: Arc<KeywordLlm>,
) -> Orchestrator {
    Orchestrator::new(
        AnalysisConfig::default(),
        Box::new(source),
        Box::new(embedder),
        Box::new(llm),
    )
    .unwrap()
    .with_cache_path(None)
}

#[test]
fn two_semantic_clusters_yield_two_topics() {
    let source = VecSource::new(two_cluster_messages());
    let embedder = CountingEmbedder::new();
    let llm = KeywordLlm::new();
    let orchestrator = build(source, embedder, llm.clone());

    let report = orchestrator
        .analyze(&AnalysisRequest::new(CHAT_ID).with_period(7), &CancelToken::new())
        .unwrap();

    assert_eq!(report.topics.len(), 2);
    assert_eq!(report.cluster_count, 2);
    assert!(report.below_minimum, "2 topics is below the configured minimum of 3");
    assert!(report.topics.iter().all(|t| !t.description.is_empty()));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);

    // Traceability: representatives come from the topic's own cluster.
    let postgres = report
        .topics
        .iter()
        .find(|t| t.title.contains("Postgres"))
        .expect("postgres topic present");
    assert_eq!(postgres.source_cluster_size, 30);
    assert!(postgres
        .representative_message_ids
        .iter()
        .all(|id| (1..=30).contains(id)));

    let movies = report.topics.iter().find(|t| t.title.contains("Кино")).unwrap();
    assert!(movies
        .representative_message_ids
        .iter()
        .all(|id| (31..=60).contains(id)));

    // Equal sizes: tie broken by earliest representative timestamp, and the
    // postgres group is older.
    assert_eq!(report.topics[0].title, postgres.title);
}

#[test]
fn insufficient_messages_short_circuits_backends() {
    let messages: Vec<ChatMessage> = (0..10)
        .map(|i| message(i, 100 + i, format!("короткое сообщение номер {} в чате", i)))
        .collect();
    let source = VecSource::new(messages);
    let embedder = CountingEmbedder::new();
    let llm = KeywordLlm::new();
    let orchestrator = build(source.clone(), embedder.clone(), llm.clone());

    let err = orchestrator
        .analyze(&AnalysisRequest::new(CHAT_ID).with_period(7), &CancelToken::new())
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::InsufficientMessages { got: 10, required: 50 }
    ));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0, "no embedding call made");
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0, "no synthesis call made");
}

#[test]
fn invalid_period_fails_before_fetch() {
    let source = VecSource::new(two_cluster_messages());
    let embedder = CountingEmbedder::new();
    let llm = KeywordLlm::new();
    let orchestrator = build(source.clone(), embedder, llm);

    let err = orchestrator
        .analyze(&AnalysisRequest::new(CHAT_ID).with_period(20), &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, AnalysisError::InvalidPeriod(_)));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0, "no fetch occurred");
}

#[test]
fn second_run_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source = VecSource::new(two_cluster_messages());
    let embedder = CountingEmbedder::new();
    let llm = KeywordLlm::new();
    let orchestrator = Orchestrator::new(
        AnalysisConfig::default(),
        Box::new(source),
        Box::new(embedder),
        Box::new(llm.clone()),
    )
    .unwrap()
    .with_cache_path(Some(dir.path().join("cache.db")));

    let request = AnalysisRequest::new(CHAT_ID).with_period(7);
    let first = orchestrator.analyze(&request, &CancelToken::new()).unwrap();
    assert!(!first.cached);
    let llm_calls_after_first = llm.calls.load(Ordering::SeqCst);

    let second = orchestrator.analyze(&request, &CancelToken::new()).unwrap();
    assert!(second.cached);
    assert_eq!(second.topics, first.topics);
    assert_eq!(llm.calls.load(Ordering::SeqCst), llm_calls_after_first);

    // Force bypasses the cache read
    let forced = orchestrator
        .analyze(&AnalysisRequest::new(CHAT_ID).with_period(7).force(), &CancelToken::new())
        .unwrap();
    assert!(!forced.cached);
}

#[test]
fn pre_cancelled_request_does_nothing() {
    let source = VecSource::new(two_cluster_messages());
    let embedder = CountingEmbedder::new();
    let llm = KeywordLlm::new();
    let orchestrator = build(source.clone(), embedder, llm);

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = orchestrator
        .analyze(&AnalysisRequest::new(CHAT_ID), &cancel)
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}

/// Source whose first fetch parks on two barriers, holding the in-flight
/// guard while the test probes the concurrency behavior.
struct ParkingSource {
    messages: Vec<ChatMessage>,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
    first: AtomicBool,
}

impl MessageSource for ParkingSource {
    fn fetch_messages(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AnalysisResult<Vec<ChatMessage>> {
        if self.first.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        Ok(self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.timestamp >= since && m.timestamp <= until)
            .cloned()
            .collect())
    }
}

#[test]
fn concurrent_same_chat_request_is_rejected() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let source = ParkingSource {
        messages: two_cluster_messages(),
        entered: entered.clone(),
        release: release.clone(),
        first: AtomicBool::new(true),
    };

    let orchestrator = Arc::new(
        Orchestrator::new(
            AnalysisConfig::default(),
            Box::new(source),
            Box::new(HashEmbedder::new()),
            Box::new(KeywordLlm::new()),
        )
        .unwrap()
        .with_cache_path(None),
    );

    let background = {
        let orchestrator = orchestrator.clone();
        std::thread::spawn(move || {
            orchestrator.analyze(&AnalysisRequest::new(CHAT_ID).with_period(7), &CancelToken::new())
        })
    };

    // First request is now inside Fetching and holds the chat claim.
    entered.wait();
    let err = orchestrator
        .analyze(&AnalysisRequest::new(CHAT_ID).with_period(7), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::AnalysisInProgress(id) if id == CHAT_ID));

    // Unblock the first request; exactly one full pipeline ran.
    release.wait();
    let report = background.join().unwrap().unwrap();
    assert_eq!(report.topics.len(), 2);
}
