//! Crate-wide error type.
//!
//! One enum covers both subsystems. The split that matters at call sites is
//! recoverable vs. fatal: collaborator failures (`Backend`, `Http`) are
//! recovered locally by the pipeline's retry-then-empty policy, while storage
//! failures (`Storage`) abort the in-progress operation.

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DistillError>;

#[derive(Debug, Error, Diagnostic)]
pub enum DistillError {
    #[error("storage error: {0}")]
    #[diagnostic(
        code(distiller::store::sqlx),
        help("Ensure the SQLite database path is valid and writable.")
    )]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    #[diagnostic(
        code(distiller::serde),
        help("Check the serialized shape of records and progress payloads.")
    )]
    Serde(#[from] serde_json::Error),

    #[error("collaborator request failed: {0}")]
    #[diagnostic(
        code(distiller::backend::http),
        help("Verify the gateway / embedding endpoint URL and that the service is running.")
    )]
    Http(#[from] reqwest::Error),

    #[error("collaborator error: {message}")]
    #[diagnostic(code(distiller::backend))]
    Backend { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(distiller::config))]
    Config(String),
}

impl DistillError {
    pub(crate) fn backend(message: impl Into<String>) -> Self {
        DistillError::Backend {
            message: message.into(),
        }
    }
}
