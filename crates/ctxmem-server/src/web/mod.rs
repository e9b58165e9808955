// crates/ctxmem-server/src/web/mod.rs
// Optional read-only HTTP side-channel: /health and /info (§6).

use crate::config::EngineConfig;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const TOOL_NAMES: [&str; 7] = [
    "ping",
    "add_message",
    "retrieve_context",
    "get_similar_contexts",
    "add_relationship",
    "get_related_contexts",
    "summarize_context",
];

#[derive(Clone)]
struct AppState {
    config: Arc<EngineConfig>,
}

/// Build the side-channel router. Both routes are GET-only and never
/// accept mutations (§6 "Optional HTTP side-channel"). When `apiKey` is
/// configured, every route requires a matching `Authorization: Bearer
/// <key>` header; when it is absent the side-channel is open.
pub fn create_router(config: Arc<EngineConfig>) -> Router {
    let state = AppState { config };
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_bearer_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected) {
        next.run(request).await
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "ctxmem",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": TOOL_NAMES,
        "config": state.config.redacted(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig {
            context_dir: "/tmp/ctx".into(),
            message_limit_threshold: 10,
            auto_summarize: true,
            use_vector_db: true,
            use_graph_db: true,
            similarity_threshold: 0.6,
            vector_dimensions: 384,
            vector_max_elements: 1000,
            enable_http_server: true,
            http_port: 3000,
            api_key: Some("secret".into()),
        })
    }

    #[tokio::test]
    async fn health_reports_ok_status() {
        let app = create_router(test_config());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("authorization", "Bearer secret")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn info_redacts_api_key() {
        let app = create_router(test_config());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/info")
                    .header("authorization", "Bearer secret")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("ping"));
    }

    #[tokio::test]
    async fn missing_bearer_token_is_rejected_when_api_key_set() {
        let app = create_router(test_config());
        let response = app
            .oneshot(Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn wrong_bearer_token_is_rejected() {
        let app = create_router(test_config());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/info")
                    .header("authorization", "Bearer wrong")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn no_auth_required_when_api_key_unset() {
        let mut config = (*test_config()).clone();
        config.api_key = None;
        let app = create_router(Arc::new(config));
        let response = app
            .oneshot(Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
