// Licensed under the MIT License.

//! Pairs outbound request envelopes with inbound replies by message id, and surfaces
//! timeouts. The pending-response map is canonical for a channel; it must not be
//! conflated with whatever task is reading frames off that channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::is_reserved_message_id;
use crate::error::{GatewaySyncError, Result};
use crate::model::SharedEvent;

struct PendingRequest {
    responder: oneshot::Sender<SharedEvent>,
    cancel: CancellationToken,
}

/// Maintains `messageId -> pending request` with per-entry deadlines, as described by
/// the request/response correlator's component design. One instance is owned per
/// channel; both [`GatewayConnector`](../../gateway_sync_connector) and
/// [`GatewayClient`](../../gateway_sync_client) hold one.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Assigns a fresh message id, registers a pending entry, arms a `timeout`
    /// deadline, and returns both the message id the caller must frame on the wire and
    /// a future that resolves when a matching reply arrives (or the deadline elapses,
    /// or the channel is torn down via [`Correlator::fail_all`]).
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::Timeout`] if `timeout` elapses first, or
    /// [`GatewaySyncError::Disconnected`] if the channel is torn down first.
    pub async fn send(self: &Arc<Self>, timeout: Duration) -> (String, PendingReply) {
        let message_id = Uuid::new_v4().to_string();
        let reply = self.send_with_id(message_id.clone(), timeout).await;
        (message_id, reply)
    }

    /// As [`Correlator::send`], but with a caller-supplied message id. This is the
    /// only entry point permitted to register the sync protocol's reserved message ids
    /// (`GATEWAY-ASSET-READ`, `GATEWAY-ASSET-READ-<n>`); callers outside the sync state
    /// machine must go through [`Correlator::send`] instead.
    pub async fn send_with_id(self: &Arc<Self>, message_id: String, timeout: Duration) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        self.pending.lock().await.insert(
            message_id.clone(),
            PendingRequest {
                responder: tx,
                cancel: cancel.clone(),
            },
        );
        PendingReply {
            correlator: Arc::clone(self),
            message_id,
            receiver: rx,
            cancel,
            timeout,
        }
    }

    /// Resolves the pending entry matching `envelope`'s message id, if any. Returns
    /// `true` if a pending request was found and resolved; `false` if no request is
    /// currently pending under that id (e.g. it already timed out, or the id was
    /// never requested — the correlator does not treat this as an error since
    /// responses and events may interleave with unrelated traffic).
    pub async fn resolve(&self, message_id: &str, event: SharedEvent) -> bool {
        let pending = self.pending.lock().await.remove(message_id);
        match pending {
            Some(entry) => {
                entry.cancel.cancel();
                entry.responder.send(event).is_ok()
            }
            None => false,
        }
    }

    /// Fails every currently-pending request with
    /// [`GatewaySyncError::Disconnected`], e.g. when the channel drops. The correlator
    /// itself is left usable for the next connection.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, entry) in pending.drain() {
            entry.cancel.cancel();
            // Dropping `responder` without sending resolves the receiver with
            // `RecvError`, which `PendingReply::await` maps to `Disconnected`.
        }
    }

    /// Number of requests currently awaiting a reply. Exposed for tests and for
    /// backpressure diagnostics.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// The future returned by [`Correlator::send`]/[`Correlator::send_with_id`].
pub struct PendingReply {
    correlator: Arc<Correlator>,
    message_id: String,
    receiver: oneshot::Receiver<SharedEvent>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl PendingReply {
    /// Awaits the matching response, the timeout, or cancellation — whichever comes
    /// first.
    ///
    /// # Errors
    /// Returns [`GatewaySyncError::Timeout`] if the deadline elapses before a reply
    /// arrives, or [`GatewaySyncError::Disconnected`] if the channel is torn down
    /// first.
    pub async fn wait(self) -> Result<SharedEvent> {
        let PendingReply {
            correlator,
            message_id,
            receiver,
            cancel,
            timeout,
        } = self;
        tokio::select! {
            result = receiver => {
                result.map_err(|_| GatewaySyncError::Disconnected)
            }
            () = tokio::time::sleep(timeout) => {
                correlator.pending.lock().await.remove(&message_id);
                Err(GatewaySyncError::Timeout { message_id })
            }
            () = cancel.cancelled() => {
                Err(GatewaySyncError::Disconnected)
            }
        }
    }
}

/// Asserts a caller-supplied message id is *not* one of the sync protocol's reserved
/// ids, for use by the general-purpose `send` path once it accepts caller ids (kept
/// separate from `send_with_id`'s unrestricted use by the sync state machine).
///
/// # Errors
/// Returns [`GatewaySyncError::ProtocolViolation`] if `message_id` is reserved.
pub fn reject_reserved_id(message_id: &str) -> Result<()> {
    if is_reserved_message_id(message_id) {
        return Err(GatewaySyncError::ProtocolViolation {
            reason: format!("message id {message_id} is reserved for the sync protocol"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeEvent, AttributeRef, EventSource};

    fn sample_event() -> SharedEvent {
        SharedEvent::Attribute(AttributeEvent {
            attribute_ref: AttributeRef::new("asset1", "temperature"),
            value: Some(serde_json::json!(21.5)),
            timestamp: 1,
            source: EventSource::Sensor,
            realm: "master".to_string(),
            parent_id: None,
        })
    }

    #[tokio::test]
    async fn resolves_matching_reply() {
        let correlator = Correlator::new();
        let (message_id, reply) = correlator.send(Duration::from_secs(5)).await;
        assert!(correlator.resolve(&message_id, sample_event()).await);
        let resolved = reply.wait().await.unwrap();
        assert_eq!(resolved, sample_event());
    }

    #[tokio::test]
    async fn resolve_for_unknown_id_is_a_noop() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve("not-pending", sample_event()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_no_reply_arrives() {
        let correlator = Correlator::new();
        let (_message_id, reply) = correlator.send(Duration::from_millis(10)).await;
        let err = reply.wait().await.unwrap_err();
        assert!(matches!(err, GatewaySyncError::Timeout { .. }));
    }

    #[tokio::test]
    async fn fail_all_disconnects_pending_requests() {
        let correlator = Correlator::new();
        let (_message_id, reply) = correlator.send(Duration::from_secs(5)).await;
        correlator.fail_all().await;
        let err = reply.wait().await.unwrap_err();
        assert!(matches!(err, GatewaySyncError::Disconnected));
    }

    #[tokio::test]
    async fn send_with_id_allows_reserved_ids() {
        use crate::codec::MSG_ID_GATEWAY_ASSET_READ;
        let correlator = Correlator::new();
        let reply = correlator
            .send_with_id(MSG_ID_GATEWAY_ASSET_READ.to_string(), Duration::from_secs(5))
            .await;
        assert!(
            correlator
                .resolve(MSG_ID_GATEWAY_ASSET_READ, sample_event())
                .await
        );
        reply.wait().await.unwrap();
    }

    #[test]
    fn reject_reserved_id_flags_reserved_ids() {
        assert!(reject_reserved_id("GATEWAY-ASSET-READ").is_err());
        assert!(reject_reserved_id("GATEWAY-ASSET-READ-20").is_err());
        assert!(reject_reserved_id("some-custom-id").is_ok());
    }
}
