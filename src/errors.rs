use thiserror::Error;

/// Errors surfaced by the cleaning pipeline.
///
/// Per-probe failures never reach this level: a stream that cannot be probed
/// is an expected outcome of the domain and is simply counted as dead.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("source not found: {path}")]
    SourceNotFound { path: String },

    #[error("invalid source url: {url}")]
    InvalidSourceUrl { url: String },

    #[error("download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("failed to read source {path}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write playlist {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
