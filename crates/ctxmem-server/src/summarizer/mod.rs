// crates/ctxmem-server/src/summarizer/mod.rs
// Extractive summarization baseline (§4.5).

use async_trait::async_trait;
use chrono::Utc;
use ctxmem_types::{CodeBlock, Message, Role, Summary};
use once_cell::sync::Lazy;
use regex::Regex;

/// Level a summary is being produced for, controlling how many sentences
/// survive the top-K cut (§4.5 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLevel {
    PerContext,
    Hierarchical,
    Meta,
}

impl SummaryLevel {
    fn top_k(self) -> usize {
        match self {
            SummaryLevel::PerContext => 7,
            SummaryLevel::Hierarchical => 10,
            SummaryLevel::Meta => 12,
        }
    }
}

/// Pluggable summarization interface; AI-backed implementations conform to
/// the same contract and must return a summary struct even when truncating.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        context_id: &str,
        messages: &[Message],
        level: SummaryLevel,
        version: u32,
    ) -> Summary;
}

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:([\w-]+)\n)?([\s\S]*?)```").unwrap());
static KEYWORD_BOOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)important|key|significant|main|critical|crucial").unwrap());

/// Purely extractive, model-free summarizer (§4.5's default implementation).
pub struct ExtractiveSummarizer;

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(
        &self,
        context_id: &str,
        messages: &[Message],
        level: SummaryLevel,
        version: u32,
    ) -> Summary {
        let concatenated = concatenate(messages);
        let sentences = split_sentences(&concatenated);
        let extract = top_k_in_order(&sentences, level.top_k());
        let code_blocks = extract_code_blocks(messages);
        let key_insights = extract_key_insights(messages);

        let text = format!(
            "Conversation with {} messages. Summary: {}",
            messages.len(),
            extract
        );

        Summary {
            context_id: context_id.to_string(),
            created_at: Utc::now().timestamp_millis(),
            text,
            code_blocks,
            key_insights,
            message_count: messages.len() as u32,
            version,
            importance_score: average_importance(messages),
            tokens_used: None,
            token_limit: None,
        }
    }
}

fn concatenate(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(&format!("{}: {}\n\n", m.role, m.content));
    }
    out
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(|c: char| c == '.' || c == '!' || c == '?')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

struct ScoredSentence {
    index: usize,
    text: String,
    score: f32,
}

/// Score by `position * length * keyword_boost * content_density` (§4.5
/// step 3), keep the top-K, re-sort to original order (step 4).
fn top_k_in_order(sentences: &[String], k: usize) -> String {
    if sentences.is_empty() {
        return String::new();
    }
    let total = sentences.len();
    let mut scored: Vec<ScoredSentence> = sentences
        .iter()
        .enumerate()
        .map(|(index, text)| ScoredSentence {
            index,
            text: text.clone(),
            score: score_sentence(text, index, total),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    scored.truncate(k);
    scored.sort_by_key(|s| s.index);

    scored
        .into_iter()
        .map(|s| s.text)
        .collect::<Vec<_>>()
        .join(". ")
}

fn score_sentence(sentence: &str, index: usize, total: usize) -> f32 {
    let position = 1.0 - (index as f32 / total as f32);
    let word_count = sentence.split_whitespace().count();
    let length = if word_count > 5 && word_count < 30 {
        1.0
    } else {
        0.5
    };
    let keyword_boost = if KEYWORD_BOOST.is_match(sentence) { 1.5 } else { 1.0 };
    let non_whitespace = sentence.chars().filter(|c| !c.is_whitespace()).count();
    let content_density = if word_count > 0 {
        non_whitespace as f32 / word_count as f32
    } else {
        0.0
    };
    position * length * keyword_boost * content_density
}

fn extract_code_blocks(messages: &[Message]) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    for m in messages {
        for caps in CODE_FENCE.captures_iter(&m.content) {
            let language = caps.get(1).map(|m| m.as_str().to_string());
            let code = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            if code.trim().is_empty() {
                continue;
            }
            blocks.push(CodeBlock {
                language,
                code,
                importance: m.importance,
                source_context_id: Some(m.context_id.clone()),
            });
        }
    }
    blocks
}

/// Sentences from user messages ending in `!` or `?`, longer than 10
/// characters, deduplicated, capped at 5 (§4.5 step 6).
fn extract_key_insights(messages: &[Message]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut insights = Vec::new();
    for m in messages {
        if m.role != Role::User {
            continue;
        }
        for raw in m.content.split_inclusive(['!', '?']) {
            let trimmed = raw.trim();
            if trimmed.len() <= 10 {
                continue;
            }
            if !(trimmed.ends_with('!') || trimmed.ends_with('?')) {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                insights.push(trimmed.to_string());
            }
            if insights.len() >= 5 {
                return insights;
            }
        }
    }
    insights
}

fn average_importance(messages: &[Message]) -> f32 {
    if messages.is_empty() {
        return 0.0;
    }
    messages.iter().map(|m| m.importance).sum::<f32>() / messages.len() as f32
}
