use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::de::DeserializeOwned;
use shared::protocol::{ClientEmit, ReplyEnvelope};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    error::SyncError,
    registry::{ChannelHandler, ChannelRegistry},
};

/// The original client would hang forever on a dropped query; a
/// bounded wait is strictly better and callers can still widen it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One-shot query over the channel abstraction: subscribe a private
/// handler on the reply channel, emit, resolve on the first envelope,
/// and unsubscribe on every exit path (reply, timeout, emit failure).
/// At most one reply is consumed per call; concurrent calls on the
/// same channel each use their own handler instance.
pub async fn request(
    registry: &Arc<ChannelRegistry>,
    emit: ClientEmit,
    timeout: Duration,
) -> Result<ReplyEnvelope, SyncError> {
    let channel = emit.channel();
    let (tx, rx) = oneshot::channel::<ReplyEnvelope>();
    let slot = Mutex::new(Some(tx));
    let handler: ChannelHandler = Arc::new(move |envelope| {
        if let Some(tx) = slot.lock().unwrap().take() {
            let _ = tx.send(envelope);
        }
    });

    registry.subscribe(channel, Arc::clone(&handler));

    let outcome = async {
        registry.emit(emit)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            // Sender dropped without firing: the registry was cleared
            // underneath us, i.e. the session was torn down.
            Ok(Err(_)) => Err(SyncError::TransportLost(
                "session torn down before reply".to_string(),
            )),
            Err(_) => {
                debug!(channel = channel.as_str(), "query timed out");
                Err(SyncError::Timeout)
            }
        }
    }
    .await;

    registry.unsubscribe(channel, &handler);
    outcome
}

/// `request` plus typed envelope decoding at the boundary.
pub async fn request_decoded<T: DeserializeOwned>(
    registry: &Arc<ChannelRegistry>,
    emit: ClientEmit,
    timeout: Duration,
) -> Result<T, SyncError> {
    let envelope = request(registry, emit, timeout).await?;
    Ok(envelope.decode::<T>()?)
}

#[cfg(test)]
#[path = "tests/request_tests.rs"]
mod tests;
