// packages/bridge/src/channel/port.rs
//! In-process message ports
//!
//! A port pair is one bidirectional channel: whatever one end sends, the
//! other end receives, in order. Both ends share a single close token, so an
//! explicit `close()` on either side, or dropping one end, ends the stream on
//! both sides exactly once.

use crate::channel::message::BridgeMessage;
use crate::utils::errors::{BridgeError, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One end of a bidirectional channel
pub struct MessagePort {
    pub sender: PortSender,
    pub receiver: PortReceiver,
}

impl MessagePort {
    /// Create two connected ports
    pub fn pair() -> (MessagePort, MessagePort) {
        let closed = CancellationToken::new();
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = MessagePort {
            sender: PortSender {
                tx: a_tx,
                closed: closed.clone(),
            },
            receiver: PortReceiver {
                rx: a_rx,
                closed: closed.clone(),
            },
        };
        let b = MessagePort {
            sender: PortSender {
                tx: b_tx,
                closed: closed.clone(),
            },
            receiver: PortReceiver { rx: b_rx, closed },
        };

        (a, b)
    }

    pub fn send(&self, message: BridgeMessage) -> Result<()> {
        self.sender.send(message)
    }

    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.receiver.recv().await
    }

    pub fn close(&self) {
        self.sender.close();
    }

    pub fn into_split(self) -> (PortSender, PortReceiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half of a port, cheap to clone
#[derive(Clone, Debug)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<BridgeMessage>,
    closed: CancellationToken,
}

impl PortSender {
    /// Queue a message for the peer
    pub fn send(&self, message: BridgeMessage) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(BridgeError::ChannelClosed(format!(
                "cannot send {} on a closed port",
                message.kind()
            )));
        }

        self.tx.send(message).map_err(|e| {
            self.closed.cancel();
            BridgeError::ChannelClosed(format!("peer dropped before {}", e.0.kind()))
        })
    }

    /// Close the channel for both ends
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the channel can no longer deliver messages
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the channel is closed from either side
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Receiving half of a port
pub struct PortReceiver {
    rx: mpsc::UnboundedReceiver<BridgeMessage>,
    closed: CancellationToken,
}

impl PortReceiver {
    /// Next message, or `None` once the channel is closed
    ///
    /// Messages sent before the close are still delivered; `None` only comes
    /// after the queue is drained.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        tokio::select! {
            biased;
            message = self.rx.recv() => {
                if message.is_none() {
                    // Peer dropped without an explicit close
                    self.closed.cancel();
                }
                message
            }
            // Closed with an empty queue
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }
}

/// Accepts channels announced by resolvers
///
/// The resolver side keeps one end of a fresh pair and delivers the other end
/// here, the way a page transfers a port to its worker.
pub trait Registrar: Send + Sync {
    fn deliver(&self, port: MessagePort) -> Result<()>;
}
