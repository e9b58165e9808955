// crates/ctxmem-server/src/mcp/mod.rs
// MCP tool surface: the 7 mandatory tools over stdio JSON-RPC (§6).

use crate::service::{ContextService, SummarizeOutcome};
use ctxmem_types::{Direction, Importance, RelationshipType, Role};
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::{RequestContext, RoleServer},
    tool, tool_router, ErrorData, ServerHandler,
};
use serde::Deserialize;
use serde_json::json;

/// MCP server state: a thin wrapper around the Context Service.
#[derive(Clone)]
pub struct ContextServer {
    service: ContextService,
    tool_router: ToolRouter<Self>,
}

impl ContextServer {
    pub fn new(service: ContextService) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddMessageRequest {
    #[serde(rename = "contextId")]
    context_id: String,
    message: String,
    role: Role,
    #[serde(default)]
    importance: Option<Importance>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct RetrieveContextRequest {
    #[serde(rename = "contextId")]
    context_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetSimilarContextsRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddRelationshipRequest {
    #[serde(rename = "sourceContextId")]
    source_context_id: String,
    #[serde(rename = "targetContextId")]
    target_context_id: String,
    #[serde(rename = "relationshipType")]
    relationship_type: RelationshipType,
    #[serde(default = "default_weight")]
    weight: f32,
}

fn default_weight() -> f32 {
    0.8
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetRelatedContextsRequest {
    #[serde(rename = "contextId")]
    context_id: String,
    #[serde(default, rename = "relationshipType")]
    relationship_type: Option<RelationshipType>,
    #[serde(default = "default_direction")]
    direction: Direction,
}

fn default_direction() -> Direction {
    Direction::Both
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SummarizeContextRequest {
    #[serde(rename = "contextId")]
    context_id: String,
}

fn err_json(message: impl Into<String>) -> String {
    json!({ "success": false, "error": message.into() }).to_string()
}

#[tool_router]
impl ContextServer {
    #[tool(description = "Check server liveness.")]
    async fn ping(&self) -> Result<String, String> {
        Ok("pong".to_string())
    }

    #[tool(description = "Append a message to a context's log, creating the context if needed.")]
    async fn add_message(
        &self,
        Parameters(req): Parameters<AddMessageRequest>,
    ) -> Result<String, String> {
        if req.message.is_empty() {
            return Err(err_json("message must not be empty"));
        }
        let importance = req.importance.unwrap_or_default().as_f32();
        match self
            .service
            .add_message(
                &req.context_id,
                req.role,
                req.message,
                importance,
                req.tags.into_iter().collect(),
            )
            .await
        {
            Ok(_) => Ok(json!({ "success": true }).to_string()),
            Err(e) => Err(err_json(e.to_user_string())),
        }
    }

    #[tool(description = "Load a context's messages, metadata, and latest summary.")]
    async fn retrieve_context(
        &self,
        Parameters(req): Parameters<RetrieveContextRequest>,
    ) -> Result<String, String> {
        match self.service.get_context(&req.context_id).await {
            Ok(Some(ctx)) => Ok(json!({
                "success": true,
                "contextId": ctx.context_id,
                "messages": ctx.messages,
                "hasSummary": ctx.has_summary,
                "summary": ctx.summary,
            })
            .to_string()),
            Ok(None) => Err(err_json(format!("context not found: {}", req.context_id))),
            Err(e) => Err(err_json(e.to_user_string())),
        }
    }

    #[tool(description = "Find contexts whose summaries are semantically similar to a query.")]
    async fn get_similar_contexts(
        &self,
        Parameters(req): Parameters<GetSimilarContextsRequest>,
    ) -> Result<String, String> {
        match self.service.find_similar(&req.query, req.limit).await {
            Ok(hits) => {
                let results: Vec<_> = hits
                    .into_iter()
                    .map(|h| json!({ "contextId": h.context_id, "similarity": h.similarity }))
                    .collect();
                Ok(json!(results).to_string())
            }
            Err(e) => Err(err_json(e.to_user_string())),
        }
    }

    #[tool(description = "Record a directed, weighted relationship between two contexts.")]
    async fn add_relationship(
        &self,
        Parameters(req): Parameters<AddRelationshipRequest>,
    ) -> Result<String, String> {
        match self
            .service
            .add_relationship(
                &req.source_context_id,
                &req.target_context_id,
                req.relationship_type,
                req.weight,
            )
            .await
        {
            Ok(()) => Ok(json!({ "success": true }).to_string()),
            Err(e) => Err(err_json(e.to_user_string())),
        }
    }

    #[tool(description = "List context ids related to a context, optionally filtered by relationship type and direction.")]
    async fn get_related_contexts(
        &self,
        Parameters(req): Parameters<GetRelatedContextsRequest>,
    ) -> Result<String, String> {
        let related = self
            .service
            .get_related(&req.context_id, req.relationship_type, req.direction)
            .await;
        Ok(json!(related).to_string())
    }

    #[tool(description = "Synchronously summarize a context now, updating the vector index and relationship graph.")]
    async fn summarize_context(
        &self,
        Parameters(req): Parameters<SummarizeContextRequest>,
    ) -> Result<String, String> {
        match self.service.summarize_now(&req.context_id).await {
            Ok(SummarizeOutcome::Summary(summary)) => Ok(json!(summary).to_string()),
            Ok(SummarizeOutcome::Empty) => Ok(String::new()),
            Err(e) => Err(err_json(e.to_user_string())),
        }
    }
}

impl ServerHandler for ContextServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "ctxmem".into(),
                title: Some("Context Memory Engine".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Durable conversational memory for AI agents: append messages, retrieve context, \
                 search by semantic similarity, and relate contexts to one another."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let ctx = ToolCallContext::new(self, request, context);
            self.tool_router.call(ctx).await
        }
    }
}

