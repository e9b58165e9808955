// crates/ctxmem-server/src/vector/fallback.rs
// Deterministic keyword-overlap search, used when the embedder is
// unavailable or holds a tombstone entry pending a later embedding (§4.3).

use super::SearchHit;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const FALLBACK_FILE: &str = "fallback-storage.json";

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "have", "has", "was",
    "were", "are", "but", "not", "you", "your", "they", "their", "what",
    "which", "when", "where", "who", "will", "would", "could", "should",
    "about", "into", "than", "then", "them", "there", "here", "been", "being",
];

#[derive(Serialize, Deserialize, Clone)]
struct Entry {
    summary_text: String,
    term_set: HashSet<String>,
}

/// `contextId -> { summaryText, termSet }`, where `termSet` is the
/// lowercased tokens of length > 3 with common stop-words removed (§4.3).
#[derive(Serialize, Deserialize)]
pub struct FallbackStore {
    #[serde(skip)]
    base_dir: PathBuf,
    entries: HashMap<String, Entry>,
}

impl FallbackStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            entries: HashMap::new(),
        }
    }

    pub async fn load(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let path = base_dir.join(FALLBACK_FILE);
        let raw = tokio::fs::read_to_string(&path).await?;
        let mut store: FallbackStore = serde_json::from_str(&raw)?;
        store.base_dir = base_dir;
        Ok(store)
    }

    pub async fn upsert(&mut self, context_id: &str, text: &str) -> Result<()> {
        self.entries.insert(
            context_id.to_string(),
            Entry {
                summary_text: text.to_string(),
                term_set: term_set(text),
            },
        );
        self.persist().await
    }

    pub async fn remove(&mut self, context_id: &str) -> Result<bool> {
        let existed = self.entries.remove(context_id).is_some();
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    /// Jaccard similarity `|A ∩ B| / |A ∪ B|` over the query's term set and
    /// each stored entry's, descending, dropping zero-overlap entries.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let query_terms = term_set(query);
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|(context_id, entry)| {
                let sim = jaccard(&query_terms, &entry.term_set);
                (sim > 0.0).then_some(SearchHit {
                    context_id: context_id.clone(),
                    similarity: sim,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        hits.truncate(k);
        Ok(hits)
    }

    async fn persist(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let tmp = self.base_dir.join(format!("{FALLBACK_FILE}.tmp"));
        let final_path = self.base_dir.join(FALLBACK_FILE);
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&tmp, &final_path).await?;
        Ok(())
    }
}

fn term_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}
