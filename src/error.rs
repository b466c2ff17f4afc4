//! Error taxonomy for the advisor core.
//!
//! Library code returns [`AdvisorError`]; the CLI and server layers wrap it
//! with `anyhow` context or map it onto HTTP statuses. Ingestion errors are
//! fatal to the operation that raised them; query-time errors degrade the
//! response instead of aborting it (see the orchestrator).

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Project root missing or unreadable. Fatal to ingestion.
    #[error("Scan failed for {path}: {reason}")]
    Scan { path: PathBuf, reason: String },

    /// Embedding provider failed after retries were exhausted.
    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    /// Stored vectors were computed under a different model than the
    /// configured one. Searches refuse until `reembed` migrates them.
    #[error("Stored embeddings use model '{stored}' but the active model is '{active}'; run `depad reembed`")]
    StaleEmbeddings { stored: String, active: String },

    /// No function registered under this name.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Missing or wrongly-typed function argument. Nothing was executed.
    #[error("Invalid argument for {function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    /// A function ran and failed. Recorded per call, non-fatal to the query.
    #[error("Function {function} failed: {reason}")]
    FunctionExecution { function: String, reason: String },

    /// Package registry lookup failed (network, status, or payload shape).
    /// Callers degrade the result rather than aborting.
    #[error("Registry lookup failed: {0}")]
    Registry(String),

    /// Caller input rejected before the pipeline starts.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Completion provider failed or returned an unusable payload.
    #[error("Completion service error: {0}")]
    CompletionService(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl AdvisorError {
    pub fn scan(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Scan {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            reason: reason.into(),
        }
    }

    pub fn function_execution(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FunctionExecution {
            function: function.into(),
            reason: reason.into(),
        }
    }
}
