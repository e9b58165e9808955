// crates/ctxmem-server/src/vector/hnsw.rs
// Primary (dense) vector index: HNSW over summary embeddings (§4.3).

use super::SearchHit;
use crate::error::{CtxError, Result};
use hora::core::ann_index::ANNIndex;
use hora::core::ann_index::SerializableIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INDEX_FILE: &str = "vector-index.bin";
const MAP_FILE: &str = "context-map.json";

/// Persisted side of the index: everything except the `hora` graph itself,
/// which is dumped to its own binary file (the library owns that format).
///
/// `label_to_vector` is kept alongside the graph so search results can be
/// re-scored with an exact cosine similarity rather than trusting distances
/// out of the ANN library, and so `compact()` can re-insert live vectors
/// without re-embedding them.
#[derive(Serialize, Deserialize)]
struct PersistedMap {
    dimension: usize,
    capacity: usize,
    next_label: u32,
    context_to_label: HashMap<String, u32>,
    label_to_vector: HashMap<u32, Vec<f32>>,
    deleted: HashSet<u32>,
}

/// Dense ANN index with label reuse and tombstone-based soft delete.
///
/// `hora`'s `HNSWIndex` has no "replace" or "remove" operation, so a label
/// that has been superseded or deleted is tracked in `deleted` and filtered
/// out of search results rather than actually removed from the graph
/// (§4.3, §9 "Label reuse in the ANN index").
pub struct HnswStore {
    base_dir: PathBuf,
    index: HNSWIndex<f32, usize>,
    dimension: usize,
    capacity: usize,
    next_label: u32,
    context_to_label: HashMap<String, u32>,
    label_to_context: HashMap<u32, String>,
    label_to_vector: HashMap<u32, Vec<f32>>,
    deleted: HashSet<u32>,
}

impl HnswStore {
    pub fn new(base_dir: impl AsRef<Path>, dimension: usize, initial_capacity: usize) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            index: fresh_index(dimension, initial_capacity),
            dimension,
            capacity: initial_capacity,
            next_label: 0,
            context_to_label: HashMap::new(),
            label_to_context: HashMap::new(),
            label_to_vector: HashMap::new(),
            deleted: HashSet::new(),
        }
    }

    pub async fn load(base_dir: impl AsRef<Path>, dimension: usize, initial_capacity: usize) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let map_path = base_dir.join(MAP_FILE);
        let index_path = base_dir.join(INDEX_FILE);

        let raw = tokio::fs::read_to_string(&map_path).await?;
        let persisted: PersistedMap = serde_json::from_str(&raw)?;

        let index = HNSWIndex::<f32, usize>::load(
            index_path
                .to_str()
                .ok_or_else(|| CtxError::IndexCorrupt("non-utf8 index path".into()))?,
        )
        .map_err(|e| CtxError::IndexCorrupt(format!("failed to load HNSW index: {e}")))?;

        let label_to_context = persisted
            .context_to_label
            .iter()
            .map(|(ctx, label)| (*label, ctx.clone()))
            .collect();

        Ok(Self {
            base_dir,
            index,
            dimension: persisted.dimension.max(dimension),
            capacity: persisted.capacity.max(initial_capacity),
            next_label: persisted.next_label,
            context_to_label: persisted.context_to_label,
            label_to_context,
            label_to_vector: persisted.label_to_vector,
            deleted: persisted.deleted,
        })
    }

    pub fn len(&self) -> usize {
        self.context_to_label.len()
    }

    /// Insert or replace the embedding for `context_id`. A replacement
    /// tombstones the old label and assigns a fresh one, since HNSW has no
    /// in-place update (§4.3).
    pub async fn upsert(&mut self, context_id: &str, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(CtxError::InvalidArgument(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimension
            )));
        }

        if let Some(&old_label) = self.context_to_label.get(context_id) {
            self.deleted.insert(old_label);
            self.label_to_context.remove(&old_label);
            self.label_to_vector.remove(&old_label);
        } else if self.context_to_label.len() >= self.capacity {
            self.capacity *= 2;
            info!(new_capacity = self.capacity, "HNSW index capacity doubled");
        }

        let label = self.next_label;
        self.next_label += 1;
        self.index
            .add(&embedding, label as usize)
            .map_err(|e| CtxError::IndexCorrupt(format!("HNSW add failed: {e}")))?;
        self.context_to_label.insert(context_id.to_string(), label);
        self.label_to_context.insert(label, context_id.to_string());
        self.label_to_vector.insert(label, embedding);

        if self.deleted_fraction() > 0.25 {
            self.compact()?;
        }
        self.persist().await?;
        Ok(())
    }

    pub async fn delete(&mut self, context_id: &str) -> Result<bool> {
        let Some(label) = self.context_to_label.remove(context_id) else {
            return Ok(false);
        };
        self.label_to_context.remove(&label);
        self.label_to_vector.remove(&label);
        self.deleted.insert(label);

        if self.deleted_fraction() > 0.25 {
            self.compact()?;
        }
        self.persist().await?;
        Ok(true)
    }

    /// `k' = min(k, currentCount)`; run the ANN shortlist against the graph
    /// as of the last `persist()` (every upsert/delete rebuilds and
    /// persists before releasing the write lock, so reads never observe a
    /// stale-by-more-than-one-write graph), then re-score each candidate
    /// with an exact cosine similarity against the cached embedding (the
    /// `hora` result order is an approximation, the similarity value must
    /// not be). Drop tombstoned labels and non-positive similarities, sort
    /// descending (§4.3).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(CtxError::InvalidArgument(format!(
                "query has {} dimensions, expected {}",
                query.len(),
                self.dimension
            )));
        }
        if self.context_to_label.is_empty() {
            return Ok(Vec::new());
        }
        let k_prime = k.min(self.context_to_label.len());

        // Over-fetch past tombstones so we still return k' live results.
        let shortlist = self
            .index
            .search(query, k_prime + self.deleted.len() + 1);

        let mut hits: Vec<SearchHit> = shortlist
            .into_iter()
            .filter_map(|raw_label| {
                let label = raw_label as u32;
                if self.deleted.contains(&label) {
                    return None;
                }
                let context_id = self.label_to_context.get(&label)?;
                let vector = self.label_to_vector.get(&label)?;
                let similarity = cosine_similarity(query, vector);
                (similarity > 0.0).then_some(SearchHit {
                    context_id: context_id.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        hits.truncate(k_prime);
        Ok(hits)
    }

    fn deleted_fraction(&self) -> f32 {
        let total = self.context_to_label.len() + self.deleted.len();
        if total == 0 {
            0.0
        } else {
            self.deleted.len() as f32 / total as f32
        }
    }

    /// Allocate a fresh index, re-insert every live embedding under a new
    /// dense label range, and swap it in. Triggered when the deleted
    /// fraction exceeds 25% of the current count (§4.3).
    fn compact(&mut self) -> Result<()> {
        debug!(
            live = self.context_to_label.len(),
            deleted = self.deleted.len(),
            "compacting HNSW index"
        );
        let mut fresh = fresh_index(self.dimension, self.capacity);
        let mut new_context_to_label = HashMap::with_capacity(self.context_to_label.len());
        let mut new_label_to_context = HashMap::with_capacity(self.context_to_label.len());
        let mut new_label_to_vector = HashMap::with_capacity(self.context_to_label.len());
        let mut next_label = 0u32;

        for (context_id, old_label) in self.context_to_label.iter() {
            let Some(vector) = self.label_to_vector.get(old_label) else {
                continue;
            };
            let new_label = next_label;
            next_label += 1;
            fresh
                .add(vector, new_label as usize)
                .map_err(|e| CtxError::IndexCorrupt(format!("HNSW add failed during compaction: {e}")))?;
            new_context_to_label.insert(context_id.clone(), new_label);
            new_label_to_context.insert(new_label, context_id.clone());
            new_label_to_vector.insert(new_label, vector.clone());
        }

        self.index = fresh;
        self.context_to_label = new_context_to_label;
        self.label_to_context = new_label_to_context;
        self.label_to_vector = new_label_to_vector;
        self.next_label = next_label;
        self.deleted.clear();
        Ok(())
    }

    pub async fn persist(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        self.index
            .build(Metric::Euclidean)
            .map_err(|e| CtxError::IndexCorrupt(format!("HNSW build failed: {e}")))?;

        let index_path = self.base_dir.join(INDEX_FILE);
        self.index
            .dump(
                index_path
                    .to_str()
                    .ok_or_else(|| CtxError::IndexCorrupt("non-utf8 index path".into()))?,
            )
            .map_err(|e| CtxError::IndexCorrupt(format!("HNSW dump failed: {e}")))?;

        let persisted = PersistedMap {
            dimension: self.dimension,
            capacity: self.capacity,
            next_label: self.next_label,
            context_to_label: self.context_to_label.clone(),
            label_to_vector: self.label_to_vector.clone(),
            deleted: self.deleted.clone(),
        };
        let tmp = self.base_dir.join(format!("{MAP_FILE}.tmp"));
        let final_path = self.base_dir.join(MAP_FILE);
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&persisted)?).await?;
        tokio::fs::rename(&tmp, &final_path).await?;
        Ok(())
    }
}

fn fresh_index(dimension: usize, capacity: usize) -> HNSWIndex<f32, usize> {
    let params = HNSWParams::<f32>::default()
        .max_item(capacity)
        .n_neighbor(16)
        .n_neighbor0(32)
        .ef_build(200)
        .ef_search(100)
        .has_deletion(true);
    HNSWIndex::new(dimension, &params)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
