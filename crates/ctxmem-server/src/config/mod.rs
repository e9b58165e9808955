// crates/ctxmem-server/src/config/mod.rs
// Configuration and shared constants

pub mod env;
pub mod file;

pub use env::{ConfigValidation, EnvConfig};
pub use file::FileConfig;

/// Fully resolved configuration used by the Context Service and its stores.
///
/// Environment variables are the single source of truth for overrides;
/// `FileConfig` supplies non-secret defaults that the environment layers on
/// top of.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub context_dir: std::path::PathBuf,
    pub message_limit_threshold: u32,
    pub auto_summarize: bool,
    pub use_vector_db: bool,
    pub use_graph_db: bool,
    pub similarity_threshold: f32,
    pub vector_dimensions: usize,
    pub vector_max_elements: usize,
    pub enable_http_server: bool,
    pub http_port: u16,
    pub api_key: Option<String>,
}

impl EngineConfig {
    /// Load environment and file configuration and merge them, environment
    /// taking priority. This is the entrypoint `main` calls once at startup.
    pub fn load() -> Self {
        let env = EnvConfig::load();
        let file = FileConfig::load();
        Self::resolve(&env, &file)
    }

    /// Merge `EnvConfig` (highest priority) over `FileConfig` (defaults).
    pub fn resolve(env: &EnvConfig, file: &FileConfig) -> Self {
        Self {
            context_dir: env
                .context_dir
                .clone()
                .or_else(|| file.context_dir.clone().map(std::path::PathBuf::from))
                .unwrap_or_else(Self::default_context_dir),
            message_limit_threshold: env
                .message_limit_threshold
                .or(file.message_limit_threshold)
                .unwrap_or(10),
            auto_summarize: env.auto_summarize.or(file.auto_summarize).unwrap_or(true),
            use_vector_db: env.use_vector_db.or(file.use_vector_db).unwrap_or(true),
            use_graph_db: env.use_graph_db.or(file.use_graph_db).unwrap_or(true),
            similarity_threshold: env
                .similarity_threshold
                .or(file.similarity_threshold)
                .unwrap_or(0.6),
            vector_dimensions: env
                .vector_dimensions
                .or(file.vector_dimensions)
                .unwrap_or(384),
            vector_max_elements: env
                .vector_max_elements
                .or(file.vector_max_elements)
                .unwrap_or(1000),
            enable_http_server: env
                .enable_http_server
                .or(file.enable_http_server)
                .unwrap_or(false),
            http_port: env.http_port.or(file.http_port).unwrap_or(3000),
            api_key: env.api_key.clone().or_else(|| file.api_key.clone()),
        }
    }

    fn default_context_dir() -> std::path::PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".context-memory")
    }

    /// Redacted view suitable for the `/info` HTTP endpoint and the MCP
    /// `ping` tool -- `apiKey` is never echoed back.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "contextDir": self.context_dir.display().to_string(),
            "messageLimitThreshold": self.message_limit_threshold,
            "autoSummarize": self.auto_summarize,
            "useVectorDb": self.use_vector_db,
            "useGraphDb": self.use_graph_db,
            "similarityThreshold": self.similarity_threshold,
            "vectorDb": {
                "dimensions": self.vector_dimensions,
                "maxElements": self.vector_max_elements,
            },
            "enableHttpServer": self.enable_http_server,
            "httpPort": self.http_port,
            "apiKey": self.api_key.as_ref().map(|_| "***redacted***"),
        })
    }
}
