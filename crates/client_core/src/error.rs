use thiserror::Error;

/// Failures of the synchronization core. Server rejections carry the
/// server-supplied diagnostic verbatim; nothing in this crate retries,
/// so every operation is at-most-once from the caller's perspective.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no credential available; sign in first")]
    NoCredential,
    #[error("not connected to the realtime server")]
    NotConnected,
    #[error("server rejected the request: {0}")]
    ServerRejected(String),
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("realtime connection lost: {0}")]
    TransportLost(String),
    #[error("failed to decode server payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<shared::protocol::EnvelopeError> for SyncError {
    fn from(value: shared::protocol::EnvelopeError) -> Self {
        match value {
            shared::protocol::EnvelopeError::Rejected(msg) => SyncError::ServerRejected(msg),
            shared::protocol::EnvelopeError::Decode(source) => SyncError::Decode(source),
        }
    }
}

/// Credential decode/expiry failures. Both are handled locally by
/// forcing a signed-out state rather than surfacing to the UI.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed credential: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("credential has expired")]
    Expired,
}
