use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Blob-store collaborator. The core only knows the boundary: bytes
/// and a folder tag go in, a remote reference comes back.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str, folder: &str) -> Result<String>;
}

/// Default stub for clients constructed without an upload backend.
pub struct MissingBlobUploader;

#[async_trait]
impl BlobUploader for MissingBlobUploader {
    async fn upload(&self, _bytes: Vec<u8>, filename: &str, folder: &str) -> Result<String> {
        Err(anyhow!(
            "blob upload backend unavailable for {folder}/{filename}"
        ))
    }
}
