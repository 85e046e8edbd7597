//! Client for the remote Semantic File Search API.

mod client;
mod error;

pub use client::{
    ApiClient, ChunkPayload, DeleteResponse, ListFilesResponse, SearchHit, SearchResponse,
    UploadResponse, remote_file_name,
};
pub use error::TransportError;
