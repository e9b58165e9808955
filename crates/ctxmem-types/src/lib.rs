// crates/ctxmem-types/src/lib.rs

//! Shared data contracts for the context memory engine.
//!
//! These types cross every boundary in the system: they are what the
//! Message Store persists, what the MCP tool layer serializes, and what the
//! Context Service passes between the Vector Index and the Relationship
//! Graph. Keeping them in their own crate means the wire format and the
//! storage format are the same `serde` derive, not two hand-synced copies.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Who sent a message within a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

/// Client-facing importance labels, mapped to the numeric `[0,1]` scale the
/// engine actually stores (§6: `LOW=0.25, MEDIUM=0.5, HIGH=0.75, CRITICAL=1.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Medium
    }
}

impl Importance {
    pub fn as_f32(self) -> f32 {
        match self {
            Importance::Low => 0.25,
            Importance::Medium => 0.5,
            Importance::High => 0.75,
            Importance::Critical => 1.0,
        }
    }
}

/// A single immutable message appended to a context's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub context_id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch, assigned by the server on append.
    pub timestamp: i64,
    pub importance: f32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Per-context bookkeeping maintained exclusively by the Context Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub context_id: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub messages_since_last_summary: u32,
    pub has_summary: bool,
    pub last_summarized_at: Option<i64>,
    pub total_message_count: u32,
    pub importance_score: Option<f32>,
}

impl Metadata {
    pub fn new(context_id: impl Into<String>, now: i64) -> Self {
        Self {
            context_id: context_id.into(),
            created_at: now,
            last_activity_at: now,
            messages_since_last_summary: 0,
            has_summary: false,
            last_summarized_at: None,
            total_message_count: 0,
            importance_score: None,
        }
    }
}

/// A code block extracted from a conversation during summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
    pub importance: f32,
    pub source_context_id: Option<String>,
}

/// The current compressed representation of a context's messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub context_id: String,
    pub created_at: i64,
    pub text: String,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    /// At most 7 entries (§3 Summary).
    #[serde(default)]
    pub key_insights: Vec<String>,
    pub message_count: u32,
    pub version: u32,
    pub importance_score: f32,
    pub tokens_used: Option<u32>,
    pub token_limit: Option<u32>,
}

/// The label/type of a directed edge between two contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Similar,
    Continues,
    References,
    Parent,
    Child,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 5] = [
        RelationshipType::Similar,
        RelationshipType::Continues,
        RelationshipType::References,
        RelationshipType::Parent,
        RelationshipType::Child,
    ];
}

/// Traversal direction for relationship queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
}

/// A directed, weighted, labeled edge between two contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: RelationshipType,
    pub weight: f32,
    pub created_at: i64,
    pub metadata: Option<serde_json::Value>,
}
