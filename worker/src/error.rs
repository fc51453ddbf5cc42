use thiserror::Error;

/// Worker-internal errors. Per the taxonomy in the core spec, these always
/// indicate a `Transient`/`Fatal` problem with the worker's own plumbing -
/// scrape failures never surface here, they're handled entirely inside the
/// retry/backoff path and never propagate as an `Err`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] scrape_core::QueueError),

    #[error("error during startup: {0}")]
    Startup(String),
}
