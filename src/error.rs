use thiserror::Error;

/// Errors surfaced by the fetcher, composer and model caller.
#[derive(Debug, Error)]
pub enum Error {
    /// A post identifier or compose target does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// Video download, decoding or transcription failed.
    #[error("video processing failed: {0}")]
    Processing(String),

    /// The thread tree violates a structural invariant.
    #[error("malformed thread: {0}")]
    MalformedInput(String),

    /// An upstream HTTP API answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// A Bluesky URL or AT URI could not be parsed.
    #[error("invalid post identifier: {0}")]
    InvalidIdentifier(String),

    /// A required setting is missing or unusable.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
