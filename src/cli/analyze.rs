use anyhow::{Context, Result};
use chat_topics::analysis::AnalysisRequest;
use chat_topics::processing::embeddings::HashEmbedder;
use chat_topics::processing::llm;
use chat_topics::source::{probe_export, JsonFileSource};
use chat_topics::{CancelToken, Orchestrator};

pub fn run(
    chat: i64,
    days: Option<i64>,
    input: &str,
    force: bool,
    config_path: Option<&str>,
) -> Result<()> {
    let config = super::resolve_config(config_path)?;
    let input_path = std::path::Path::new(input);
    probe_export(input_path).context("Cannot read chat export")?;

    let llm_backend = llm::backend_from_config(&config.synthesis);
    let orchestrator = Orchestrator::new(
        config,
        Box::new(JsonFileSource::new(input_path)),
        Box::new(HashEmbedder::new()),
        llm_backend,
    )
    .context("Failed to build analysis pipeline")?;

    let mut request = AnalysisRequest::new(chat);
    request.period_days = days;
    request.force = force;

    let report = orchestrator
        .analyze(&request, &CancelToken::new())
        .map_err(|e| anyhow::anyhow!("{} ({})", e, e.kind()))?;

    println!(
        "Chat {} — {} topics from {} messages over {}d{}",
        report.chat_id,
        report.topics.len(),
        report.message_count,
        report.period_days,
        if report.cached { " (cached)" } else { "" },
    );
    if report.below_minimum {
        println!(
            "Note: fewer topics than the configured minimum ({} clusters, {} dropped)",
            report.cluster_count, report.dropped_clusters
        );
    }
    println!();

    for (i, topic) in report.topics.iter().enumerate() {
        println!("{}. {}", i + 1, topic.title);
        println!("   {}", topic.description);
        println!(
            "   [{} messages, examples: {}]",
            topic.source_cluster_size,
            topic
                .representative_message_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}
