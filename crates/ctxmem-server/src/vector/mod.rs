// crates/ctxmem-server/src/vector/mod.rs
// Semantic search over context summaries: HNSW primary, Jaccard-keyword
// fallback, composed into a single tiered facade (§4.3, §9 Design Notes).

mod fallback;
mod hnsw;

pub use fallback::FallbackStore;
pub use hnsw::HnswStore;

use crate::embedder::{EmbedOutcome, Embedder};
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// A (contextId, similarity) pair, similarity in `(0, 1]`, descending.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub context_id: String,
    pub similarity: f32,
}

/// Composed vector store: tries the dense ANN index first, and keeps a
/// keyword-overlap twin current at all times so the engine degrades rather
/// than stops answering when the embedding model is unavailable (§4.3, §9).
///
/// The whole structure sits behind one reader-writer lock: reads (`search`)
/// take a read guard, writes (`upsert`/`delete`/compaction) take a write
/// guard. Searches never block each other.
pub struct TieredVectorStore {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    primary: HnswStore,
    fallback: FallbackStore,
}

impl TieredVectorStore {
    pub async fn new(base_dir: impl AsRef<Path>, dimensions: usize, max_elements: usize) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        tokio::fs::create_dir_all(base_dir).await?;

        let primary = match HnswStore::load(base_dir, dimensions, max_elements).await {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "no persisted HNSW index found, starting fresh");
                HnswStore::new(base_dir, dimensions, max_elements)
            }
        };
        let fallback = FallbackStore::load(base_dir)
            .await
            .unwrap_or_else(|_| FallbackStore::new(base_dir));

        Ok(Self {
            inner: Arc::new(RwLock::new(Inner { primary, fallback })),
        })
    }

    /// Compute (or fail to compute) an embedding for `text` and upsert it
    /// under `context_id` into whichever tier is appropriate, persisting
    /// immediately.
    pub async fn upsert(
        &self,
        embedder: &dyn Embedder,
        context_id: &str,
        text: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        match embedder.embed(text).await {
            EmbedOutcome::Vector(v) => {
                inner.primary.upsert(context_id, v).await?;
                // A later successful embedding upgrades the entry out of
                // fallback mode (§4.3 "Transition between modes").
                inner.fallback.remove(context_id).await?;
            }
            EmbedOutcome::Unavailable => {
                inner.fallback.upsert(context_id, text).await?;
            }
        }
        Ok(())
    }

    /// Search both tiers and merge. A context whose embedding failed on a
    /// given call lives only in `fallback` (§4.1 "per-call inference errors
    /// ... Unavailable for that call only"); it must stay reachable here
    /// even once other contexts have a dense embedding and `primary.len() >
    /// 0` (§4.3 "subsequent searches in either mode can surface it").
    pub async fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let inner = self.inner.read().await;

        let mut hits = if inner.primary.len() > 0 {
            match embedder.embed(query).await {
                EmbedOutcome::Vector(q) => inner.primary.search(&q, k)?,
                EmbedOutcome::Unavailable => Vec::new(),
            }
        } else {
            Vec::new()
        };

        for hit in inner.fallback.search(query, k)? {
            if !hits.iter().any(|h: &SearchHit| h.context_id == hit.context_id) {
                hits.push(hit);
            }
        }

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn delete(&self, context_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let a = inner.primary.delete(context_id).await?;
        let b = inner.fallback.remove(context_id).await?;
        Ok(a || b)
    }
}
