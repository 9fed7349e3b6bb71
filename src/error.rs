use thiserror::Error;

/// Why one scrape of one target did not publish anything.
///
/// None of these are fatal: the target is skipped for the tick and retried on the next one.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("response body is not valid JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("invalid replication status: {0}")]
    InvalidSnapshot(#[source] serde_json::Error),
}
