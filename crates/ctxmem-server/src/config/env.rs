// crates/ctxmem-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, info, warn};

/// All recognized `CTXMEM_*` environment variable overrides, collected once
/// at startup. Anything unset here falls through to `FileConfig` and then to
/// the hard defaults in `EngineConfig::resolve`.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub context_dir: Option<std::path::PathBuf>,
    pub message_limit_threshold: Option<u32>,
    pub auto_summarize: Option<bool>,
    pub use_vector_db: Option<bool>,
    pub use_graph_db: Option<bool>,
    pub similarity_threshold: Option<f32>,
    pub vector_dimensions: Option<usize>,
    pub vector_max_elements: Option<usize>,
    pub enable_http_server: Option<bool>,
    pub http_port: Option<u16>,
    pub api_key: Option<String>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup).
    pub fn load() -> Self {
        info!("loading environment configuration");

        let config = Self {
            context_dir: std::env::var("CTXMEM_CONTEXT_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(std::path::PathBuf::from),
            message_limit_threshold: parse_env("CTXMEM_MESSAGE_LIMIT_THRESHOLD"),
            auto_summarize: parse_bool_env("CTXMEM_AUTO_SUMMARIZE"),
            use_vector_db: parse_bool_env("CTXMEM_USE_VECTOR_DB"),
            use_graph_db: parse_bool_env("CTXMEM_USE_GRAPH_DB"),
            similarity_threshold: parse_env("CTXMEM_SIMILARITY_THRESHOLD"),
            vector_dimensions: parse_env("CTXMEM_VECTOR_DIMENSIONS"),
            vector_max_elements: parse_env("CTXMEM_VECTOR_MAX_ELEMENTS"),
            enable_http_server: parse_bool_env("CTXMEM_ENABLE_HTTP_SERVER"),
            http_port: parse_env("CTXMEM_HTTP_PORT"),
            api_key: std::env::var("CTXMEM_API_KEY").ok().filter(|s| !s.is_empty()),
        };

        config.log_status();
        config
    }

    fn log_status(&self) {
        if self.context_dir.is_none() {
            debug!("CTXMEM_CONTEXT_DIR unset, falling back to config file / default");
        }
        if self.api_key.is_some() {
            debug!("CTXMEM_API_KEY set, HTTP side-channel requires bearer auth");
        }
    }

    /// Validate the environment configuration. Returns warnings/errors but
    /// never fails the process outright -- callers decide whether to start
    /// serving with degraded settings.
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if let Some(t) = self.similarity_threshold {
            if !(0.0..=1.0).contains(&t) {
                validation.add_error(format!(
                    "CTXMEM_SIMILARITY_THRESHOLD must be in [0,1], got {t}"
                ));
            }
        }

        if let Some(d) = self.vector_dimensions {
            if d == 0 {
                validation.add_error("CTXMEM_VECTOR_DIMENSIONS must be greater than 0");
            }
        }

        if self.enable_http_server == Some(true) && self.api_key.is_none() {
            validation.add_warning(
                "CTXMEM_ENABLE_HTTP_SERVER is set but CTXMEM_API_KEY is not -- /info and /health will be unauthenticated",
            );
        }

        validation
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).or_else(|| {
        if std::env::var(name).is_ok() {
            warn!(var = name, "failed to parse environment override, ignoring");
        }
        None
    })
}

pub(crate) fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(var = name, value, "unrecognized boolean value, ignoring");
            None
        }
    }
}

/// Configuration validation result (warnings never block startup).
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {err}"));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {warn}"));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_flags_out_of_range_threshold() {
        let env = EnvConfig {
            similarity_threshold: Some(1.5),
            ..Default::default()
        };
        let validation = env.validate();
        assert!(!validation.is_valid());
    }

    #[test]
    fn validation_warns_on_unauthenticated_http() {
        let env = EnvConfig {
            enable_http_server: Some(true),
            api_key: None,
            ..Default::default()
        };
        let validation = env.validate();
        assert!(validation.is_valid());
        assert!(!validation.warnings.is_empty());
    }

    #[test]
    fn empty_env_validates_clean() {
        let validation = EnvConfig::default().validate();
        assert!(validation.is_valid());
        assert!(validation.warnings.is_empty());
    }
}
