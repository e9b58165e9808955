// crates/ctxmem-server/src/service/mod.rs
// Context Service: the orchestrator that keeps the Message Store, Vector
// Index, and Relationship Graph consistent (§4.5).

use crate::config::EngineConfig;
use crate::embedder::Embedder;
use crate::error::{CtxError, Result};
use crate::graph::RelationshipGraph;
use crate::store::MessageStore;
use crate::summarizer::{SummaryLevel, Summarizer};
use crate::vector::TieredVectorStore;
use chrono::Utc;
use ctxmem_types::{Direction, Message, Metadata, RelationshipType, Role, Summary};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Aggregate view returned by `getContext` (§4.5, §6 `retrieve_context`).
#[derive(Debug, Clone)]
pub struct ContextAggregate {
    pub context_id: String,
    pub messages: Vec<Message>,
    pub has_summary: bool,
    pub summary: Option<Summary>,
}

/// Outcome of a `summarizeNow` call (§4.5 step semantics).
#[derive(Debug, Clone)]
pub enum SummarizeOutcome {
    Summary(Summary),
    Empty,
}

/// Top-5 neighbor similarity threshold for automatic `SIMILAR` edge
/// creation (§4.4).
const AUTO_EDGE_TOP_K: usize = 5;

/// Orchestrates the three stores. Cheaply cloneable: every field is an
/// `Arc`, so the MCP layer can hand out one instance per connection.
#[derive(Clone)]
pub struct ContextService {
    store: Arc<MessageStore>,
    vector: Arc<TieredVectorStore>,
    graph: Arc<RelationshipGraph>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    config: Arc<EngineConfig>,
    /// Single-flight gate: a context id present here already has a
    /// summarization task in flight (§5 "Background summarization task").
    summarizing: Arc<Mutex<HashSet<String>>>,
    /// Tracks spawned background summarization tasks so they can be drained
    /// on graceful shutdown instead of leaking past process exit (§5, §6).
    background_tasks: Arc<Mutex<tokio::task::JoinSet<()>>>,
}

impl ContextService {
    pub fn new(
        store: Arc<MessageStore>,
        vector: Arc<TieredVectorStore>,
        graph: Arc<RelationshipGraph>,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            vector,
            graph,
            embedder,
            summarizer,
            config,
            summarizing: Arc::new(Mutex::new(HashSet::new())),
            background_tasks: Arc::new(Mutex::new(tokio::task::JoinSet::new())),
        }
    }

    /// The resolved configuration this service was built with.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.clone()
    }

    /// Await every in-flight background summarization task to completion.
    /// Called once on graceful shutdown so no task leaks past process exit
    /// (§5 "drained on graceful shutdown").
    pub async fn shutdown(&self) {
        let mut tasks = self.background_tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "background summarization task panicked during shutdown");
            }
        }
    }

    /// Append a message, update metadata, and (if the threshold is crossed)
    /// coalesce a fire-and-forget summarization trigger for this context
    /// (§4.5 `addMessage`).
    pub async fn add_message(
        &self,
        context_id: &str,
        role: Role,
        content: String,
        importance: f32,
        tags: std::collections::BTreeSet<String>,
    ) -> Result<Metadata> {
        let now = Utc::now().timestamp_millis();
        let message = Message {
            context_id: context_id.to_string(),
            role,
            content,
            timestamp: now,
            importance,
            tags,
        };

        // Append failure aborts the whole call -- the client can safely
        // retry (§4.5 "Failure semantics").
        self.store.append(&message).await?;

        let mut meta = self
            .store
            .load_metadata(context_id)
            .await?
            .unwrap_or_else(|| Metadata::new(context_id, now));
        meta.messages_since_last_summary += 1;
        meta.total_message_count += 1;
        meta.last_activity_at = now;
        self.store.save_metadata(&meta).await?;

        if meta.messages_since_last_summary >= self.config.message_limit_threshold
            && self.config.auto_summarize
        {
            self.trigger_background_summary(context_id).await;
        }

        Ok(meta)
    }

    pub async fn get_context(&self, context_id: &str) -> Result<Option<ContextAggregate>> {
        let Some(meta) = self.store.load_metadata(context_id).await? else {
            return Ok(None);
        };
        let messages = self.store.load_messages(context_id).await?;
        let summary = self.store.load_summary(context_id).await?;
        Ok(Some(ContextAggregate {
            context_id: context_id.to_string(),
            messages,
            has_summary: meta.has_summary,
            summary,
        }))
    }

    pub async fn find_similar(&self, query: &str, k: usize) -> Result<Vec<crate::vector::SearchHit>> {
        self.vector.search(self.embedder.as_ref(), query, k).await
    }

    /// Verify both contexts exist (metadata check) before delegating to the
    /// Graph (§4.5 `addRelationship`).
    pub async fn add_relationship(
        &self,
        source: &str,
        target: &str,
        edge_type: RelationshipType,
        weight: f32,
    ) -> Result<()> {
        if self.store.load_metadata(source).await?.is_none() {
            return Err(CtxError::NotFound(format!("context not found: {source}")));
        }
        if self.store.load_metadata(target).await?.is_none() {
            return Err(CtxError::NotFound(format!("context not found: {target}")));
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(CtxError::InvalidArgument(format!(
                "weight must be within [0,1], got {weight}"
            )));
        }
        self.graph
            .add_edge(source, target, edge_type, weight, None, Utc::now().timestamp_millis())
            .await
    }

    pub async fn get_related(
        &self,
        context_id: &str,
        edge_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Vec<String> {
        self.graph.neighbors(context_id, edge_type, direction).await
    }

    /// Synchronous summarization path (§4.5 `summarizeNow`).
    pub async fn summarize_now(&self, context_id: &str) -> Result<SummarizeOutcome> {
        let outcome = self.summarize_inner(context_id, SummaryLevel::PerContext).await?;
        Ok(outcome)
    }

    async fn summarize_inner(&self, context_id: &str, level: SummaryLevel) -> Result<SummarizeOutcome> {
        let messages = self.store.load_messages(context_id).await?;
        if messages.is_empty() {
            return Ok(SummarizeOutcome::Empty);
        }

        let mut meta = self
            .store
            .load_metadata(context_id)
            .await?
            .unwrap_or_else(|| Metadata::new(context_id, Utc::now().timestamp_millis()));
        let version = self
            .store
            .load_summary(context_id)
            .await?
            .map_or(1, |s| s.version + 1);

        let summary = self
            .summarizer
            .summarize(context_id, &messages, level, version)
            .await;

        self.store.save_summary(&summary).await?;

        // A failure after message append but during vector/graph update is
        // logged and tolerated -- the summary itself is already durable
        // (§4.5 "Failure semantics").
        if self.config.use_vector_db {
            if let Err(e) = self.vector.upsert(self.embedder.as_ref(), context_id, &summary.text).await {
                warn!(context_id, error = %e, "vector upsert failed after summarization, continuing");
            } else if self.config.use_graph_db {
                if let Err(e) = self.create_similarity_edges(context_id).await {
                    warn!(context_id, error = %e, "automatic similarity edge creation failed");
                }
            }
        }

        meta.messages_since_last_summary = 0;
        meta.has_summary = true;
        meta.last_summarized_at = Some(Utc::now().timestamp_millis());
        self.store.save_metadata(&meta).await?;

        Ok(SummarizeOutcome::Summary(summary))
    }

    /// After a successful summary+embedding upsert, query the top-5
    /// neighbors and record `SIMILAR` edges above the configured threshold
    /// (§4.4 "Automatic edge creation").
    async fn create_similarity_edges(&self, context_id: &str) -> Result<()> {
        let Some(ctx) = self.get_context(context_id).await? else {
            return Ok(());
        };
        let Some(summary) = ctx.summary else {
            return Ok(());
        };

        let neighbors = self
            .vector
            .search(self.embedder.as_ref(), &summary.text, AUTO_EDGE_TOP_K)
            .await?;

        for hit in neighbors {
            if hit.context_id == context_id {
                continue;
            }
            if hit.similarity > self.config.similarity_threshold {
                self.graph
                    .add_edge(
                        context_id,
                        &hit.context_id,
                        RelationshipType::Similar,
                        hit.similarity,
                        None,
                        Utc::now().timestamp_millis(),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Coalesces concurrent triggers for the same context into a single
    /// in-flight task: if one is already running, this call is a no-op
    /// (§5 "Background summarization task is single-flight per context").
    async fn trigger_background_summary(&self, context_id: &str) {
        let context_id = context_id.to_string();
        let service = self.clone();
        let task = async move {
            {
                let mut inflight = service.summarizing.lock().await;
                if !inflight.insert(context_id.clone()) {
                    return;
                }
            }
            info!(context_id, "background summarization started");
            if let Err(e) = service.summarize_inner(&context_id, SummaryLevel::PerContext).await {
                error!(context_id, error = %e, "background summarization failed");
            }
            service.summarizing.lock().await.remove(&context_id);
        };
        self.background_tasks.lock().await.spawn(task);
    }

    pub async fn delete_context(&self, context_id: &str) -> Result<bool> {
        let existed = self.store.delete(context_id).await?;
        if self.config.use_vector_db {
            self.vector.delete(context_id).await?;
        }
        if self.config.use_graph_db {
            self.graph.remove(context_id).await?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::embedder::StubEmbedder;
    use crate::summarizer::ExtractiveSummarizer;

    async fn make_service(dir: &std::path::Path) -> ContextService {
        let store = Arc::new(MessageStore::new(dir.join("store")).await.unwrap());
        let vector = Arc::new(
            TieredVectorStore::new(dir.join("vectors"), 128, 100)
                .await
                .unwrap(),
        );
        let graph = Arc::new(RelationshipGraph::new(dir));
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(128));
        let summarizer: Arc<dyn Summarizer> = Arc::new(ExtractiveSummarizer);
        let config = Arc::new(EngineConfig {
            context_dir: dir.to_path_buf(),
            message_limit_threshold: 3,
            auto_summarize: true,
            use_vector_db: true,
            use_graph_db: true,
            similarity_threshold: 0.1,
            vector_dimensions: 128,
            vector_max_elements: 100,
            enable_http_server: false,
            http_port: 3000,
            api_key: None,
        });
        ContextService::new(store, vector, graph, embedder, summarizer, config)
    }

    #[tokio::test]
    async fn add_message_creates_metadata_and_increments_counts() {
        let dir = tempfile::tempdir().unwrap();
        let service = make_service(dir.path()).await;
        let meta = service
            .add_message("c1", Role::User, "hello".into(), 0.5, Default::default())
            .await
            .unwrap();
        assert_eq!(meta.total_message_count, 1);
        assert_eq!(meta.messages_since_last_summary, 1);
    }

    #[tokio::test]
    async fn get_context_returns_none_for_unknown_context() {
        let dir = tempfile::tempdir().unwrap();
        let service = make_service(dir.path()).await;
        assert!(service.get_context("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summarize_now_on_empty_context_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = make_service(dir.path()).await;
        let outcome = service.summarize_now("never-existed").await.unwrap();
        assert!(matches!(outcome, SummarizeOutcome::Empty));
    }

    #[tokio::test]
    async fn summarize_now_resets_counter_and_marks_has_summary() {
        let dir = tempfile::tempdir().unwrap();
        let service = make_service(dir.path()).await;
        service
            .add_message("c1", Role::User, "PostgreSQL replication write-ahead log".into(), 0.5, Default::default())
            .await
            .unwrap();

        let outcome = service.summarize_now("c1").await.unwrap();
        assert!(matches!(outcome, SummarizeOutcome::Summary(_)));

        let meta = service.store.load_metadata("c1").await.unwrap().unwrap();
        assert_eq!(meta.messages_since_last_summary, 0);
        assert!(meta.has_summary);
    }

    #[tokio::test]
    async fn add_relationship_rejects_unknown_context() {
        let dir = tempfile::tempdir().unwrap();
        let service = make_service(dir.path()).await;
        service
            .add_message("c1", Role::User, "hi".into(), 0.5, Default::default())
            .await
            .unwrap();
        let err = service
            .add_relationship("c1", "missing", RelationshipType::Similar, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, CtxError::NotFound(_)));
    }

    #[tokio::test]
    async fn automatic_similarity_edge_created_on_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let service = make_service(dir.path()).await;
        service
            .add_message("postgres", Role::User, "PostgreSQL replication write-ahead log streaming".into(), 0.5, Default::default())
            .await
            .unwrap();
        service
            .add_message("postgres2", Role::User, "PostgreSQL replication streaming write-ahead".into(), 0.5, Default::default())
            .await
            .unwrap();

        service.summarize_now("postgres").await.unwrap();
        service.summarize_now("postgres2").await.unwrap();

        let related = service
            .get_related("postgres", Some(RelationshipType::Similar), Direction::Outgoing)
            .await;
        assert!(related.contains(&"postgres2".to_string()));
    }
}
