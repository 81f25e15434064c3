use std::path::PathBuf;

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

/// Failures of the knowledge store and its vector index.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("knowledge base {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("vector index {path} is corrupt: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// Fatal configuration error: the persisted index and the embedding model disagree.
    #[error("vector dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
}

/// Failures of the session registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("an interview is already in progress")]
    AlreadyRunning,

    #[error("no active interview session with id {0}")]
    UnknownSession(uuid::Uuid),

    #[error("interview session {0} has already ended")]
    SessionEnded(uuid::Uuid),
}
