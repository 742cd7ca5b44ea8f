use thiserror::Error;

/// Unified error type for the entire Vitae platform.
#[derive(Error, Debug)]
pub enum VitaeError {
    // ── Caller-visible errors ──────────────────────────────────
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("kv store error: {0}")]
    KvStore(String),

    // ── Retrieval errors ───────────────────────────────────────
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch { got: usize, expected: usize },

    // ── Scrape errors ──────────────────────────────────────────
    #[error("scrape error: {0}")]
    Scrape(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VitaeError>;
