//! Side-channel collaborator: plain request/response fetch of a named
//! external resource, used to hydrate large structured fields outside the
//! main channel. Interface only — implementations live with the embedding
//! application.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Fetch one named resource as text.
pub trait BlobFetcher: Send {
    fn fetch(&self, name: &str) -> Result<String, FetchError>;
}

/// Collaborator that has nothing: every fetch misses. Used in tests and
/// headless runs.
#[derive(Debug, Default)]
pub struct NullFetcher;

impl BlobFetcher for NullFetcher {
    fn fetch(&self, name: &str) -> Result<String, FetchError> {
        Err(FetchError::NotFound(name.to_string()))
    }
}
