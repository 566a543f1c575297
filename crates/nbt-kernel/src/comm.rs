//! Sync channel: the one bidirectional pipe between the kernel-side
//! registries and the front-end.
//!
//! Outbound frames are handed to the attached transport on a spawned task,
//! so a burst of sends never blocks the caller. Frames sent back to back
//! may reach the transport in any order.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use nbt_types::comm::{ClientMessage, CommFrame, KernelMessage};
use nbt_types::{NbError, NbResult};

/// Something that can carry frames to the front-end.
#[async_trait]
pub trait CommTransport: Send + Sync {
    async fn transmit(&self, frame: &CommFrame) -> Result<()>;
}

pub struct SyncChannel {
    name: String,
    transport: RwLock<Option<Arc<dyn CommTransport>>>,
    runtime: Handle,
}

impl SyncChannel {
    pub fn new(name: impl Into<String>, runtime: Handle) -> Self {
        Self {
            name: name.into(),
            transport: RwLock::new(None),
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a front-end, replacing any previous one.
    pub fn attach(&self, transport: Arc<dyn CommTransport>) {
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = Some(transport);
        debug!("Comm {} attached", self.name);
    }

    pub fn detach(&self) {
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("Comm {} detached", self.name);
    }

    pub fn is_attached(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Send `{func, payload}` to the front-end. Silently dropped when no
    /// front-end is attached yet; it will ask for a fresh update on attach.
    pub fn send(&self, func: &str, payload: Value) {
        if let Err(NbError::TransportUnavailable) = self.try_send(func, payload) {
            debug!("Comm {} not attached, dropping {}", self.name, func);
        }
    }

    /// Like [`SyncChannel::send`], but reports a missing front-end.
    pub fn try_send(&self, func: &str, payload: Value) -> NbResult<()> {
        let transport = self
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NbError::TransportUnavailable)?;
        self.spawn_transmit(transport, CommFrame::new(func, payload));
        Ok(())
    }

    pub fn send_message(&self, message: KernelMessage) {
        let func = message.func();
        match message.into_frame() {
            Ok(frame) => self.send(&frame.func, frame.payload),
            Err(e) => warn!("Failed to serialize {} message: {}", func, e),
        }
    }

    /// Decode one inbound line. Malformed or unknown messages are logged
    /// and dropped.
    pub fn decode(&self, line: &str) -> Option<ClientMessage> {
        let frame: CommFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Comm {} received malformed message: {}", self.name, e);
                return None;
            }
        };
        let message = ClientMessage::from_frame(&frame);
        if message.is_none() {
            warn!("Comm {} received unknown message: {}", self.name, frame.func);
        }
        message
    }

    fn spawn_transmit(&self, transport: Arc<dyn CommTransport>, frame: CommFrame) {
        let name = self.name.clone();
        self.runtime.spawn(async move {
            if let Err(e) = transport.transmit(&frame).await {
                warn!("Comm {} failed to send {}: {:#}", name, frame.func, e);
            }
        });
    }
}

/// Newline-delimited JSON over any async writer.
pub struct NdjsonTransport<W> {
    writer: Mutex<W>,
}

impl<W> NdjsonTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W> CommTransport for NdjsonTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn transmit(&self, frame: &CommFrame) -> Result<()> {
        let json = serde_json::to_string(frame).context("Failed to serialize comm frame")?;
        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Forwards frames into an in-process channel.
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<CommFrame>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CommFrame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl CommTransport for ChannelTransport {
    async fn transmit(&self, frame: &CommFrame) -> Result<()> {
        self.sender
            .send(frame.clone())
            .map_err(|_| anyhow::anyhow!("Front-end channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn send_without_transport_is_dropped() {
        let channel = SyncChannel::new("nbtools_comm", Handle::current());
        channel.send("update", json!({}));
        assert!(matches!(
            channel.try_send("update", json!({})),
            Err(NbError::TransportUnavailable)
        ));
    }

    #[tokio::test]
    async fn send_reaches_attached_transport() {
        let channel = SyncChannel::new("nbtools_comm", Handle::current());
        let (transport, mut rx) = ChannelTransport::new();
        channel.attach(Arc::new(transport));
        channel.send("notification", json!({"message": "hi"}));

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.func, "notification");
        assert_eq!(frame.payload["message"], "hi");
    }

    #[tokio::test]
    async fn detach_stops_delivery() {
        let channel = SyncChannel::new("nbtools_comm", Handle::current());
        let (transport, mut rx) = ChannelTransport::new();
        channel.attach(Arc::new(transport));
        channel.detach();
        channel.send("update", json!({}));
        assert!(!channel.is_attached());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn decode_drops_unknown_and_malformed() {
        let channel = SyncChannel::new("nbtools_comm", Handle::current());
        assert_eq!(
            channel.decode(r#"{"func": "request_update"}"#),
            Some(ClientMessage::RequestUpdate)
        );
        assert_eq!(channel.decode(r#"{"func": "reboot"}"#), None);
        assert_eq!(channel.decode("not json"), None);
    }

    #[tokio::test]
    async fn ndjson_writes_one_frame_per_line() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = NdjsonTransport::new(server);
        transport
            .transmit(&CommFrame::new("update", json!({"import": false})))
            .await
            .unwrap();
        transport
            .transmit(&ClientMessage::RequestUpdate.to_frame())
            .await
            .unwrap();

        let mut lines = BufReader::new(client).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first, json!({"func": "update", "payload": {"import": false}}));
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"{"func":"request_update"}"#
        );
    }
}
