// crates/ctxmem-server/src/config/file.rs
// File-based configuration from ~/.context-memory/config.toml

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Non-secret defaults loaded from disk. Every field is optional -- a
/// setting left out of the file falls through to `EngineConfig::resolve`'s
/// hard defaults, and any `CTXMEM_*` environment variable always wins over
/// whatever is recorded here.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct FileConfig {
    #[serde(default)]
    pub context_dir: Option<String>,
    #[serde(default)]
    pub message_limit_threshold: Option<u32>,
    #[serde(default)]
    pub auto_summarize: Option<bool>,
    #[serde(default)]
    pub use_vector_db: Option<bool>,
    #[serde(default)]
    pub use_graph_db: Option<bool>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    #[serde(default)]
    pub vector_dimensions: Option<usize>,
    #[serde(default)]
    pub vector_max_elements: Option<usize>,
    #[serde(default)]
    pub enable_http_server: Option<bool>,
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl FileConfig {
    /// Load config from `~/.context-memory/config.toml`, falling back to
    /// `Self::default()` on any read or parse failure rather than aborting
    /// startup.
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| {
                warn!("HOME directory not set -- using current directory for config. Consider setting $HOME.");
                PathBuf::from(".")
            })
            .join(".context-memory")
            .join("config.toml")
    }
}
