// crates/ctxmem-server/src/cli/tool.rs
// Direct tool execution from the command line, bypassing the MCP transport.

use anyhow::{anyhow, Result};
use ctxmem::service::{ContextService, SummarizeOutcome};
use ctxmem_types::{Direction, Importance, RelationshipType, Role};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct AddMessageArgs {
    #[serde(rename = "contextId")]
    context_id: String,
    message: String,
    role: Role,
    #[serde(default)]
    importance: Option<Importance>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct RetrieveContextArgs {
    #[serde(rename = "contextId")]
    context_id: String,
}

#[derive(Deserialize)]
struct GetSimilarContextsArgs {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

#[derive(Deserialize)]
struct AddRelationshipArgs {
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

#[derive(Deserialize)]
struct GetRelatedContextsArgs {
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

#[derive(Deserialize)]
struct SummarizeContextArgs {
    #[serde(rename = "contextId")]
    context_id: String,
}

/// Run one tool by name with raw JSON arguments and print the result to stdout.
pub async fn run_tool(service: ContextService, name: String, args: String) -> Result<()> {
    let result = match name.as_str() {
        "ping" => json!({ "success": true, "message": "pong" }),
        "add_message" => {
            let req: AddMessageArgs = serde_json::from_str(&args)?;
            let importance = req.importance.unwrap_or_default().as_f32();
            let meta = service
                .add_message(
                    &req.context_id,
                    req.role,
                    req.message,
                    importance,
                    req.tags.into_iter().collect(),
                )
                .await
                .map_err(|e| anyhow!(e.to_user_string()))?;
            json!({ "success": true, "metadata": meta })
        }
        "retrieve_context" => {
            let req: RetrieveContextArgs = serde_json::from_str(&args)?;
            match service
                .get_context(&req.context_id)
                .await
                .map_err(|e| anyhow!(e.to_user_string()))?
            {
                Some(ctx) => json!({
                    "success": true,
                    "contextId": ctx.context_id,
                    "messages": ctx.messages,
                    "hasSummary": ctx.has_summary,
                    "summary": ctx.summary,
                }),
                None => return Err(anyhow!("context not found: {}", req.context_id)),
            }
        }
        "get_similar_contexts" => {
            let req: GetSimilarContextsArgs = serde_json::from_str(&args)?;
            let hits = service
                .find_similar(&req.query, req.limit)
                .await
                .map_err(|e| anyhow!(e.to_user_string()))?;
            json!(hits
                .into_iter()
                .map(|h| json!({ "contextId": h.context_id, "similarity": h.similarity }))
                .collect::<Vec<_>>())
        }
        "add_relationship" => {
            let req: AddRelationshipArgs = serde_json::from_str(&args)?;
            service
                .add_relationship(
                    &req.source_context_id,
                    &req.target_context_id,
                    req.relationship_type,
                    req.weight,
                )
                .await
                .map_err(|e| anyhow!(e.to_user_string()))?;
            json!({ "success": true })
        }
        "get_related_contexts" => {
            let req: GetRelatedContextsArgs = serde_json::from_str(&args)?;
            let related = service
                .get_related(&req.context_id, req.relationship_type, req.direction)
                .await;
            json!(related)
        }
        "summarize_context" => {
            let req: SummarizeContextArgs = serde_json::from_str(&args)?;
            match service
                .summarize_now(&req.context_id)
                .await
                .map_err(|e| anyhow!(e.to_user_string()))?
            {
                SummarizeOutcome::Summary(summary) => json!(summary),
                SummarizeOutcome::Empty => json!({ "success": true, "empty": true }),
            }
        }
        other => return Err(anyhow!("unknown tool: {other}")),
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
