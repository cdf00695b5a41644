// packages/bridge/src/channel/framed.rs
//! Byte-stream transport for bridge channels
//!
//! Adapts any `AsyncRead + AsyncWrite` stream (TCP socket, pipe, in-memory
//! duplex) into a `MessagePort`, one JSON message per line. This lets the
//! resolver live in another process while the rest of the bridge only ever
//! deals with ports.

use crate::channel::message::BridgeMessage;
use crate::channel::port::MessagePort;
use futures::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

/// Longest accepted line (bytes); bounds memory for a misbehaving peer
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Spawn a pump task between `io` and a new port, returning the local end
///
/// The port closes when the stream hits EOF or errors, and the stream is
/// dropped when the port is closed.
pub fn spawn_framed<T>(io: T) -> MessagePort
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (local, remote) = MessagePort::pair();
    let (sender, mut receiver) = remote.into_split();
    let framed = Framed::new(io, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    let (mut sink, mut stream) = framed.split::<String>();

    tokio::spawn(async move {
        let mut writable = true;

        loop {
            tokio::select! {
                outbound = receiver.recv() => {
                    let Some(message) = outbound else {
                        debug!("Port closed, shutting down framed transport");
                        break;
                    };
                    if !write_frame(&mut sink, &message).await {
                        writable = false;
                        break;
                    }
                }
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<BridgeMessage>(&line) {
                                Ok(message) => {
                                    if sender.send(message).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Discarding malformed frame: {}", e),
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Framed transport read failed: {}", e);
                            break;
                        }
                        None => {
                            debug!("Framed transport reached EOF");
                            break;
                        }
                    }
                }
            }
        }

        // Inbound frames are already queued on the port and stay readable.
        // Flush what the local side sent before the close, then shut down.
        sender.close();
        if writable {
            while let Some(message) = receiver.recv().await {
                if !write_frame(&mut sink, &message).await {
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                debug!("Framed transport shutdown failed: {}", e);
            }
        }
    });

    local
}

/// Encode and write one message; `false` once the stream is unusable
async fn write_frame<S>(sink: &mut S, message: &BridgeMessage) -> bool
where
    S: Sink<String, Error = LinesCodecError> + Unpin,
{
    let line = match serde_json::to_string(message) {
        Ok(line) => line,
        Err(e) => {
            warn!("Failed to encode {}: {}", message.kind(), e);
            return true;
        }
    };

    match sink.send(line).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Framed transport write failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_outbound_messages_are_lines() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let port = spawn_framed(ours);

        port.send(BridgeMessage::RegisterClient).unwrap();

        let mut lines = BufReader::new(theirs).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"type":"REGISTER_CLIENT"}"#);
    }

    #[tokio::test]
    async fn test_inbound_lines_become_messages() {
        let (ours, mut theirs) = tokio::io::duplex(4096);
        let mut port = spawn_framed(ours);

        theirs
            .write_all(b"not json\n{\"type\":\"CLIENT_REGISTERED\",\"clientId\":\"c9\"}\n")
            .await
            .unwrap();

        match port.recv().await {
            Some(BridgeMessage::ClientRegistered { client_id }) => {
                assert_eq!(client_id.as_str(), "c9")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frames_before_eof_are_delivered() {
        let (ours, mut theirs) = tokio::io::duplex(4096);
        let mut port = spawn_framed(ours);

        theirs
            .write_all(b"{\"type\":\"CLIENT_REGISTERED\",\"clientId\":\"c3\"}\n")
            .await
            .unwrap();
        theirs.shutdown().await.unwrap();
        drop(theirs);

        assert!(matches!(
            port.recv().await,
            Some(BridgeMessage::ClientRegistered { .. })
        ));
        assert!(port.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_flushes_outbound_frames() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let port = spawn_framed(ours);

        port.send(BridgeMessage::RegisterClient).unwrap();
        port.close();

        let mut lines = BufReader::new(theirs).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"{"type":"REGISTER_CLIENT"}"#
        );
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_closes_port() {
        let (ours, theirs) = tokio::io::duplex(64);
        let mut port = spawn_framed(ours);

        drop(theirs);

        assert!(port.recv().await.is_none());
        assert!(port.sender.is_closed());
    }
}
