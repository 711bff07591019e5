use thiserror::Error;

/// Errors surfaced by the host-facing operations
///
/// Per-link and per-entry failures never show up here: they are folded into
/// check outcomes and skipped tallies.
#[derive(Debug, Error)]
pub enum RelinkError {
    /// Resolution was requested before any channel index was built
    #[error("channel index not ready: scan at least one source first")]
    NotReady,

    /// A single source could not be fetched or read
    #[error("source '{name}' failed: {reason}")]
    Source { name: String, reason: String },

    /// The HTTP client could not be constructed
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Program guide catalog could not be parsed
    #[error("program guide error: {0}")]
    Guide(String),
}

pub type Result<T> = std::result::Result<T, RelinkError>;
