// Licensed under the MIT License.

//! The bidirectional text-frame channel the codec rides on. The channel itself is
//! abstracted — realized here as WebSocket — so the rest of the subsystem only ever
//! depends on [`ChannelSender`]/[`ChannelReceiver`], a pair of in-process queues,
//! never on `tokio-tungstenite` directly.
//!
//! Per the concurrency model, outbound sends and inbound receives run on two
//! cooperating tasks that communicate through these queues; whichever task owns the
//! real socket is the only one that touches it. [`ChannelSender`] is cheaply
//! cloneable so every call site that needs to push a frame (handshake, forwarding, a
//! disconnect notice) can hold its own handle, while [`ChannelReceiver`] is owned
//! exclusively by whichever task runs the read loop.
//!
//! Both queues are bounded: unbounded queuing lets a stalled consumer pile up
//! unreferenced memory for as long as the peer keeps producing. A full queue rejects
//! the send rather than blocking the caller, since most send call sites are not
//! themselves cancellation-safe suspension points.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Capacity used by [`duplex_pair`], which only ever backs test fixtures; production
/// channels size themselves from `GatewaySyncConfig::inbound_queue_capacity`.
const TEST_CHANNEL_CAPACITY: usize = 256;

/// A cloneable handle for queuing outbound frames.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<String>,
}

impl ChannelSender {
    /// Returns `false` if the channel has already closed or its bounded queue is
    /// currently full.
    pub fn send(&self, frame: String) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

/// The single-consumer half of a connection's inbound frames.
pub struct ChannelReceiver {
    rx: mpsc::Receiver<String>,
}

impl ChannelReceiver {
    /// Awaits the next inbound frame, or `None` once the channel has closed and every
    /// already-queued frame has been drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// A connection's sender and receiver, before either task has claimed its half.
pub struct ChannelEndpoint {
    pub sender: ChannelSender,
    pub receiver: ChannelReceiver,
}

impl ChannelEndpoint {
    #[must_use]
    pub fn split(self) -> (ChannelSender, ChannelReceiver) {
        (self.sender, self.receiver)
    }
}

/// Two [`ChannelEndpoint`]s wired directly to each other, with no socket in between.
/// Used by the connector and client test suites to exercise the protocol without a
/// real network.
#[must_use]
pub fn duplex_pair() -> (ChannelEndpoint, ChannelEndpoint) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::channel(TEST_CHANNEL_CAPACITY);
    let (b_to_a_tx, b_to_a_rx) = mpsc::channel(TEST_CHANNEL_CAPACITY);
    (
        ChannelEndpoint {
            sender: ChannelSender { tx: a_to_b_tx },
            receiver: ChannelReceiver { rx: b_to_a_rx },
        },
        ChannelEndpoint {
            sender: ChannelSender { tx: b_to_a_tx },
            receiver: ChannelReceiver { rx: a_to_b_rx },
        },
    )
}

/// Spawns the read and write tasks that bridge a live WebSocket stream to a
/// [`ChannelEndpoint`]. Binary frames and anything that is not valid UTF-8 text are
/// dropped with a log line rather than surfaced as a protocol violation — the codec's
/// malformed-frame handling only applies to well-formed text frames whose *content*
/// fails to parse.
///
/// `inbound_capacity` bounds the queue of frames read off the socket but not yet
/// claimed by [`ChannelReceiver::recv`]; once full, the read task blocks before
/// pulling the next WebSocket message, so a slow consumer throttles the peer instead
/// of this task buffering frames without limit.
pub fn bridge_websocket<S>(ws: WebSocketStream<S>, inbound_capacity: usize) -> ChannelEndpoint
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(inbound_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(inbound_capacity);

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {
                    log::debug!("dropping non-text WebSocket frame");
                }
                Err(err) => {
                    log::warn!("WebSocket read error, closing channel: {err}");
                    break;
                }
            }
        }
    });

    ChannelEndpoint {
        sender: ChannelSender { tx: outbound_tx },
        receiver: ChannelReceiver { rx: inbound_rx },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_pair_delivers_frames_both_ways() {
        let (a, b) = duplex_pair();
        let (a_tx, _a_rx) = a.split();
        let (b_tx, mut b_rx) = b.split();
        assert!(a_tx.send("hello".to_string()));
        assert_eq!(b_rx.recv().await, Some("hello".to_string()));
        assert!(b_tx.send("world".to_string()));
        drop(b_tx);
    }

    #[tokio::test]
    async fn recv_returns_none_after_peer_drops() {
        let (a, b) = duplex_pair();
        let (_a_tx, a_rx) = a.split();
        let (b_tx, mut b_rx) = b.split();
        drop(b_tx);
        drop(a_rx);
        assert_eq!(b_rx.recv().await, None);
    }

    #[tokio::test]
    async fn sender_handle_clones_share_the_same_queue() {
        let (a, b) = duplex_pair();
        let (a_tx, _a_rx) = a.split();
        let (_b_tx, mut b_rx) = b.split();
        let cloned = a_tx.clone();
        assert!(cloned.send("via clone".to_string()));
        assert_eq!(b_rx.recv().await, Some("via clone".to_string()));
    }
}
