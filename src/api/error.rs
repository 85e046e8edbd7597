//! Error types for the remote API client.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from talking to the Semantic File Search API.
///
/// The daemon logs these and moves on; a failed upload is never retried.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("API key not configured. Run: sfs config set api_key <your-key>")]
    MissingApiKey,

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}
