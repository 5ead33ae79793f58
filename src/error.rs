use thiserror::Error;

/// Network-level failures. All of them are retried by the orchestrator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("connection failed for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed reading body of {url}: {reason}")]
    Body { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists for {key}")]
    DuplicateKey { key: String },

    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("invalid record JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why one pipeline attempt failed. Everything except a duplicate key is retried.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The only error an extraction run surfaces to its caller.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("persistence conflict: {0}")]
    PersistenceConflict(StoreError),
}
