use logrelay_queue::QueueError;

/// Fatal configuration problems. Any of these aborts startup; the process
/// never runs with a partially valid writer set.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("no log writer configured")]
    NoWriters,

    #[error("no log writer configured for the mandatory 'default' category")]
    MissingDefault,

    #[error("invalid configuration for log writer [{category}]: {reason}")]
    InvalidWriter { category: String, reason: String },
}

/// Rejections and failures at the ingestion gate. Validation errors map to a
/// producer-visible 4xx, queue errors to a 5xx.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing parameter [category]")]
    EmptyCategory,

    #[error("missing parameter [message]")]
    EmptyMessage,

    #[error("category may not contain the record separator")]
    InvalidCategory,

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A failed writer invocation. Every variant feeds the same retry/requeue
/// decision in the dispatch engine; the distinctions exist for logging.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to reach destination: {0}")]
    Transport(String),

    #[error("destination rejected the record with status {0}")]
    RemoteStatus(u16),

    #[error("invalid response from destination: {0}")]
    InvalidResponse(String),

    #[error("fanout enqueue failed: {0}")]
    Fanout(#[from] IngestError),
}
