// crates/ctxmem-server/src/error.rs
// Standardized error types for the context memory engine (spec §7).

use thiserror::Error;

/// Error kinds the engine distinguishes internally (spec §7).
#[derive(Error, Debug)]
pub enum CtxError {
    /// Context or summary absent. Never propagated as a hard failure across
    /// the tool boundary — callers turn this into `{success:false, error}`.
    #[error("not found: {0}")]
    NotFound(String),

    /// Empty string where required, unknown enum value, weight outside
    /// `[0,1]`. Rejected before any state change.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ANN or map file unreadable on load. Recovery: archive the bad file,
    /// fall back to keyword mode, continue serving.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// Embedder init failed or a per-call inference failure. Triggers
    /// fallback mode, possibly permanently (init failure never retries).
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Operation exceeded its deadline; state is consistent at the
    /// pre-timeout checkpoint.
    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, CtxError>;

impl CtxError {
    /// Render for the MCP tool boundary. Never includes a `Debug`
    /// representation or a backtrace (spec §7: "Stack traces are never
    /// exposed").
    pub fn to_user_string(&self) -> String {
        self.to_string()
    }
}

impl From<String> for CtxError {
    fn from(s: String) -> Self {
        CtxError::InvalidArgument(s)
    }
}

impl From<tokio::task::JoinError> for CtxError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            CtxError::Cancelled
        } else {
            CtxError::Anyhow(err.into())
        }
    }
}

impl From<CtxError> for String {
    fn from(err: CtxError) -> Self {
        err.to_string()
    }
}
