use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::Frame;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::{error::SyncError, registry::ChannelRegistry, session::Credential};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The two halves of an established transport, already framed as
/// JSON text. Dropping the outbound sender closes the write side;
/// the inbound receiver ends when the transport is lost.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Seam between the connection manager and the physical transport.
/// Reconnection/backoff lives behind this boundary, not in the core.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, server_url: &str, token: &str) -> Result<TransportLink>;
}

/// Websocket transport. Bridges the socket into mpsc channels so the
/// manager's read loop stays transport-agnostic.
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, server_url: &str, token: &str) -> Result<TransportLink> {
        let ws_url = if let Some(rest) = server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(anyhow!("server_url must start with http:// or https://"));
        };
        let ws_url = format!("{}/ws?token={token}", ws_url.trim_end_matches('/'));

        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_writer.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("websocket receive failed: {err}");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Owns the single realtime connection for one signed-in session.
/// The transport handle is never exposed; consumers reach the wire
/// only through the registry.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
    server_url: String,
    state: Mutex<ConnectionState>,
    state_tx: broadcast::Sender<ConnectionState>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(server_url: impl Into<String>, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (state_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            transport,
            registry: Arc::new(ChannelRegistry::new()),
            server_url: server_url.into(),
            state: Mutex::new(ConnectionState::Disconnected),
            state_tx,
            read_task: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// State transitions observable by UI surfaces and tests.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
        let _ = self.state_tx.send(next);
    }

    /// Opens the connection bound to `credential`. No-op when already
    /// Connected (or a dial is in flight); fails with `NoCredential`
    /// when none is available.
    pub async fn open(self: &Arc<Self>, credential: Option<&Credential>) -> Result<()> {
        let Some(credential) = credential else {
            return Err(SyncError::NoCredential.into());
        };

        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting => {
                warn!("open() while a connection attempt is in flight; ignoring");
                return Ok(());
            }
            ConnectionState::Disconnected => {}
        }

        self.set_state(ConnectionState::Connecting);

        let link = match self
            .transport
            .connect(&self.server_url, &credential.token)
            .await
        {
            Ok(link) => link,
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        self.registry.bind(link.outbound);

        let manager = Arc::clone(self);
        let mut inbound = link.inbound;
        let task = tokio::spawn(async move {
            // Single reader: frames are dispatched strictly in arrival
            // order, and every handler runs to completion before the
            // next frame is taken.
            while let Some(text) = inbound.recv().await {
                match serde_json::from_str::<Frame>(&text) {
                    Ok(frame) => {
                        manager.registry.publish_incoming(frame.channel, frame.body);
                    }
                    Err(err) => {
                        warn!("dropping unparseable server frame: {err}");
                    }
                }
            }
            // Transport gone; the core only records the resulting
            // Disconnected state, recovery belongs to the caller.
            manager.registry.unbind();
            manager.set_state(ConnectionState::Disconnected);
            info!("realtime connection closed by transport");
        });
        *self.read_task.lock().unwrap() = Some(task);

        self.set_state(ConnectionState::Connected);
        info!(
            user_id = credential.user().id.as_str(),
            "realtime connection established"
        );
        Ok(())
    }

    /// Tears the connection down from any state. Idempotent.
    pub fn close(&self) {
        if let Some(task) = self.read_task.lock().unwrap().take() {
            task.abort();
        }
        self.registry.unbind();
        if self.state() != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
            info!("realtime connection closed");
        }
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
