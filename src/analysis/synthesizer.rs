//! Topic synthesis — one LLM call per cluster, title + description out.
//!
//! Selects a bounded representative subset of the cluster's messages,
//! builds a fixed instruction template, and parses the backend's free-text
//! reply into a tagged variant. Malformed output gets exactly one retry
//! with a stricter template before the cluster is dropped; a single bad
//! cluster never aborts the whole analysis.

use crate::config::SynthesisConfig;
use crate::constants::{truncate_safe, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS};
use crate::message::ChatMessage;
use crate::processing::embeddings::cosine_similarity;
use crate::processing::llm::LlmBackend;
use crate::topic::Topic;
use crate::{AnalysisError, AnalysisResult};

/// Parse result of one completion. The retry/drop policy operates on this
/// variant, never on raw strings.
#[derive(Debug, Clone)]
pub enum SynthesisParse {
    Ok(TopicDraft),
    Malformed(String),
}

/// Validated title/description pair before topic assembly.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TopicDraft {
    pub title: String,
    pub description: String,
}

/// Representative subset of one cluster, ready for prompting.
pub struct ClusterDigest<'a> {
    pub cluster_id: usize,
    pub size: usize,
    /// Most central first, capped at `max_representatives`.
    pub representatives: Vec<&'a ChatMessage>,
}

impl<'a> ClusterDigest<'a> {
    /// Pick the messages closest to the cluster centroid, most central
    /// first, ties broken by input order.
    pub fn build(
        cluster_id: usize,
        members: &[(&'a ChatMessage, &'a [f32])],
        max_representatives: usize,
    ) -> Self {
        let dim = members.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut centroid = vec![0.0f32; dim];
        for (_, vector) in members {
            for (c, v) in centroid.iter_mut().zip(vector.iter()) {
                *c += v;
            }
        }
        let count = members.len().max(1) as f32;
        for c in centroid.iter_mut() {
            *c /= count;
        }

        let mut ranked: Vec<(usize, f64)> = members
            .iter()
            .enumerate()
            .map(|(i, (_, vector))| (i, cosine_similarity(&centroid, vector)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let representatives = ranked
            .into_iter()
            .take(max_representatives)
            .map(|(i, _)| members[i].0)
            .collect();

        Self {
            cluster_id,
            size: members.len(),
            representatives,
        }
    }

    fn earliest_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.representatives.iter().map(|m| m.timestamp).min()
    }
}

/// A synthesized topic plus the ranking key it carries.
#[derive(Debug, Clone)]
pub struct SynthesizedTopic {
    pub topic: Topic,
    pub earliest_representative: chrono::DateTime<chrono::Utc>,
}

/// Synthesize one topic from one non-noise cluster.
///
/// `LlmUnavailable` propagates (fatal for the run); repeated malformed
/// output becomes `SynthesisDropped` (non-fatal, logged by the caller).
pub fn synthesize(
    backend: &dyn LlmBackend,
    digest: &ClusterDigest<'_>,
    config: &SynthesisConfig,
) -> AnalysisResult<SynthesizedTopic> {
    let first = backend.generate(&build_prompt(digest, config, false))?;
    let draft = match parse_completion(&first) {
        SynthesisParse::Ok(draft) => draft,
        SynthesisParse::Malformed(raw) => {
            tracing::warn!(
                cluster = digest.cluster_id,
                raw_len = raw.len(),
                "Malformed completion, retrying with strict prompt"
            );
            let second = backend.generate(&build_prompt(digest, config, true))?;
            match parse_completion(&second) {
                SynthesisParse::Ok(draft) => draft,
                SynthesisParse::Malformed(raw) => {
                    return Err(AnalysisError::SynthesisDropped {
                        cluster_id: digest.cluster_id,
                        reason: format!("malformed output after retry ({} chars)", raw.len()),
                    });
                }
            }
        }
    };

    let topic = Topic {
        title: truncate_safe(draft.title.trim(), TITLE_MAX_CHARS),
        description: truncate_safe(draft.description.trim(), DESCRIPTION_MAX_CHARS),
        source_cluster_size: digest.size,
        representative_message_ids: digest.representatives.iter().map(|m| m.id).collect(),
    };

    let earliest_representative = digest
        .earliest_timestamp()
        .unwrap_or_else(crate::time_utils::now);

    tracing::debug!(cluster = digest.cluster_id, title = %topic.title, "Topic synthesized");
    Ok(SynthesizedTopic {
        topic,
        earliest_representative,
    })
}

fn build_prompt(digest: &ClusterDigest<'_>, config: &SynthesisConfig, strict: bool) -> String {
    let examples: String = digest
        .representatives
        .iter()
        .filter_map(|m| m.normalized_text.as_deref())
        .map(|t| format!("- {}\n", truncate_safe(t, 200)))
        .collect();

    let strictness = if strict {
        "\nPrevious reply was not valid JSON. Reply with the JSON object ONLY: \
         first character '{', last character '}'. No prose, no code fences.\n"
    } else {
        ""
    };

    format!(
        r#"You generate meetup agenda topics from group-chat discussions.

Below are {size} messages from one topical discussion. Produce one agenda topic as JSON only (no markdown, no explanation):
{{"title":"...","description":"..."}}

Rules:
- Title in {language}, 2-5 words, specific to the discussion.
- Description in {language}, 1-3 sentences on what the group would discuss.
- Never start the title with generic prefixes like "Discussion:" or "Topic:".
{strictness}
Messages:
{examples}"#,
        size = digest.size,
        language = config.language,
        strictness = strictness,
        examples = examples,
    )
}

/// Split the raw completion into the tagged parse variant.
pub fn parse_completion(response: &str) -> SynthesisParse {
    // Locate the outermost JSON object in the reply
    let json_str = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => return SynthesisParse::Malformed(response.to_string()),
    };

    let draft: TopicDraft = match serde_json::from_str(json_str) {
        Ok(d) => d,
        Err(_) => return SynthesisParse::Malformed(response.to_string()),
    };

    if draft.title.trim().is_empty() || draft.description.trim().is_empty() {
        return SynthesisParse::Malformed(response.to_string());
    }

    SynthesisParse::Ok(draft)
}
