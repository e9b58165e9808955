// crates/ctxmem-server/src/graph/mod.rs
// Directed weighted relationship graph between contexts (§4.4).

use crate::error::Result;
use ctxmem_types::{Direction, Edge, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const GRAPH_FILE: &str = "graph-data.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeAttrs {
    edge_type: RelationshipType,
    weight: f32,
    created_at: i64,
    metadata: Option<serde_json::Value>,
}

/// Persisted shape: a flat edge list, rebuilt into adjacency maps on load.
#[derive(Serialize, Deserialize, Default)]
struct PersistedGraph {
    edges: Vec<Edge>,
}

struct Inner {
    /// `source -> target -> attrs`. `(source, target)` is unique; re-adding
    /// updates type/weight/metadata in place and preserves `createdAt`.
    outgoing: HashMap<String, HashMap<String, EdgeAttrs>>,
    /// `target -> set of source`, kept only for fast `neighbors(.., Incoming)`.
    incoming: HashMap<String, HashSet<String>>,
}

/// Directed, weighted, labeled graph of relationships between contexts,
/// persisted as a single JSON document after every mutation (§4.4).
pub struct RelationshipGraph {
    base_dir: PathBuf,
    inner: RwLock<Inner>,
}

impl RelationshipGraph {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            inner: RwLock::new(Inner {
                outgoing: HashMap::new(),
                incoming: HashMap::new(),
            }),
        }
    }

    pub async fn load(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let path = base_dir.join(GRAPH_FILE);
        let raw = tokio::fs::read_to_string(&path).await?;
        let persisted: PersistedGraph = serde_json::from_str(&raw)?;

        let mut outgoing: HashMap<String, HashMap<String, EdgeAttrs>> = HashMap::new();
        let mut incoming: HashMap<String, HashSet<String>> = HashMap::new();
        for edge in persisted.edges {
            outgoing.entry(edge.source.clone()).or_default().insert(
                edge.target.clone(),
                EdgeAttrs {
                    edge_type: edge.edge_type,
                    weight: edge.weight,
                    created_at: edge.created_at,
                    metadata: edge.metadata,
                },
            );
            incoming.entry(edge.target).or_default().insert(edge.source);
        }

        Ok(Self {
            base_dir,
            inner: RwLock::new(Inner { outgoing, incoming }),
        })
    }

    /// Add or update the edge `source -> target`. `createdAt` is preserved
    /// across updates; everything else is overwritten.
    pub async fn add_edge(
        &self,
        source: &str,
        target: &str,
        edge_type: RelationshipType,
        weight: f32,
        metadata: Option<serde_json::Value>,
        now: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let created_at = inner
            .outgoing
            .get(source)
            .and_then(|m| m.get(target))
            .map(|a| a.created_at)
            .unwrap_or(now);

        inner
            .outgoing
            .entry(source.to_string())
            .or_default()
            .insert(
                target.to_string(),
                EdgeAttrs {
                    edge_type,
                    weight,
                    created_at,
                    metadata,
                },
            );
        inner
            .incoming
            .entry(target.to_string())
            .or_default()
            .insert(source.to_string());

        drop(inner);
        self.persist().await
    }

    /// Remove every edge touching `ctx`, in either direction.
    pub async fn remove(&self, ctx: &str) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some(targets) = inner.outgoing.remove(ctx) {
            for target in targets.keys() {
                if let Some(sources) = inner.incoming.get_mut(target) {
                    sources.remove(ctx);
                }
            }
        }
        if let Some(sources) = inner.incoming.remove(ctx) {
            for source in sources {
                if let Some(targets) = inner.outgoing.get_mut(&source) {
                    targets.remove(ctx);
                }
            }
        }

        drop(inner);
        self.persist().await
    }

    pub async fn neighbors(
        &self,
        ctx: &str,
        edge_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Vec<String> {
        self.edges(ctx, edge_type, direction)
            .await
            .into_iter()
            .map(|e| if e.source == ctx { e.target } else { e.source })
            .collect()
    }

    pub async fn edges(
        &self,
        ctx: &str,
        edge_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Vec<Edge> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();

        if matches!(direction, Direction::Outgoing | Direction::Both) {
            if let Some(targets) = inner.outgoing.get(ctx) {
                for (target, attrs) in targets {
                    if edge_type.is_none_or(|t| t == attrs.edge_type) {
                        out.push(to_edge(ctx, target, attrs));
                    }
                }
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            if let Some(sources) = inner.incoming.get(ctx) {
                for source in sources {
                    if let Some(attrs) = inner.outgoing.get(source).and_then(|m| m.get(ctx)) {
                        if edge_type.is_none_or(|t| t == attrs.edge_type) {
                            out.push(to_edge(source, ctx, attrs));
                        }
                    }
                }
            }
        }
        out
    }

    /// Plain BFS over the undirected union of edges; first path found,
    /// shortest by edge count, ties broken by neighbor iteration order.
    /// Empty if either endpoint is absent or disconnected (§4.4).
    pub async fn shortest_path(&self, source: &str, target: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        if !inner.outgoing.contains_key(source)
            && !inner.incoming.contains_key(source)
            && source != target
        {
            return Vec::new();
        }
        if source == target {
            return vec![source.to_string()];
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut came_from: HashMap<String, String> = HashMap::new();

        visited.insert(source.to_string());
        queue.push_back(source.to_string());

        while let Some(current) = queue.pop_front() {
            for next in undirected_neighbors(&inner, &current) {
                if visited.contains(&next) {
                    continue;
                }
                visited.insert(next.clone());
                came_from.insert(next.clone(), current.clone());
                if next == target {
                    return reconstruct_path(&came_from, source, &next);
                }
                queue.push_back(next);
            }
        }
        Vec::new()
    }

    async fn persist(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let inner = self.inner.read().await;
        let mut edges = Vec::new();
        for (source, targets) in inner.outgoing.iter() {
            for (target, attrs) in targets {
                edges.push(to_edge(source, target, attrs));
            }
        }
        let persisted = PersistedGraph { edges };

        let tmp = self.base_dir.join(format!("{GRAPH_FILE}.tmp"));
        let final_path = self.base_dir.join(GRAPH_FILE);
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&persisted)?).await?;
        tokio::fs::rename(&tmp, &final_path).await?;
        Ok(())
    }
}

fn to_edge(source: &str, target: &str, attrs: &EdgeAttrs) -> Edge {
    Edge {
        source: source.to_string(),
        target: target.to_string(),
        edge_type: attrs.edge_type,
        weight: attrs.weight,
        created_at: attrs.created_at,
        metadata: attrs.metadata.clone(),
    }
}

fn undirected_neighbors(inner: &Inner, ctx: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    if let Some(targets) = inner.outgoing.get(ctx) {
        for target in targets.keys() {
            if seen.insert(target.clone()) {
                out.push(target.clone());
            }
        }
    }
    if let Some(sources) = inner.incoming.get(ctx) {
        for source in sources {
            if seen.insert(source.clone()) {
                out.push(source.clone());
            }
        }
    }
    out
}

fn reconstruct_path(came_from: &HashMap<String, String>, source: &str, target: &str) -> Vec<String> {
    let mut path = vec![target.to_string()];
    let mut current = target;
    while current != source {
        let prev = &came_from[current];
        path.push(prev.clone());
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_edge_then_neighbors_outgoing() {
        let dir = tempfile::tempdir().unwrap();
        let graph = RelationshipGraph::new(dir.path());
        graph
            .add_edge("a", "b", RelationshipType::Similar, 0.8, None, 1000)
            .await
            .unwrap();

        let neighbors = graph
            .neighbors("a", Some(RelationshipType::Similar), Direction::Outgoing)
            .await;
        assert_eq!(neighbors, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn re_adding_edge_preserves_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let graph = RelationshipGraph::new(dir.path());
        graph
            .add_edge("a", "b", RelationshipType::Similar, 0.5, None, 1000)
            .await
            .unwrap();
        graph
            .add_edge("a", "b", RelationshipType::Continues, 0.9, None, 2000)
            .await
            .unwrap();

        let edges = graph.edges("a", None, Direction::Outgoing).await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].created_at, 1000);
        assert_eq!(edges[0].weight, 0.9);
        assert_eq!(edges[0].edge_type, RelationshipType::Continues);
    }

    #[tokio::test]
    async fn shortest_path_finds_two_hop_route() {
        let dir = tempfile::tempdir().unwrap();
        let graph = RelationshipGraph::new(dir.path());
        graph
            .add_edge("a", "b", RelationshipType::Similar, 0.5, None, 1000)
            .await
            .unwrap();
        graph
            .add_edge("b", "c", RelationshipType::Similar, 0.5, None, 1000)
            .await
            .unwrap();

        let path = graph.shortest_path("a", "c").await;
        assert_eq!(path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn shortest_path_empty_when_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let graph = RelationshipGraph::new(dir.path());
        graph
            .add_edge("a", "b", RelationshipType::Similar, 0.5, None, 1000)
            .await
            .unwrap();
        graph
            .add_edge("x", "y", RelationshipType::Similar, 0.5, None, 1000)
            .await
            .unwrap();

        assert!(graph.shortest_path("a", "y").await.is_empty());
    }

    #[tokio::test]
    async fn remove_drops_all_touching_edges() {
        let dir = tempfile::tempdir().unwrap();
        let graph = RelationshipGraph::new(dir.path());
        graph
            .add_edge("a", "b", RelationshipType::Similar, 0.5, None, 1000)
            .await
            .unwrap();
        graph
            .add_edge("c", "a", RelationshipType::References, 0.5, None, 1000)
            .await
            .unwrap();

        graph.remove("a").await.unwrap();
        assert!(graph.edges("a", None, Direction::Both).await.is_empty());
        assert!(graph.edges("c", None, Direction::Outgoing).await.is_empty());
    }
}
