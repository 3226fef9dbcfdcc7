// Licensed under the MIT License.

//! Error taxonomy for the gateway synchronization subsystem.

use thiserror::Error;

/// Top-level error type produced anywhere in the gateway synchronization subsystem.
///
/// The variant set is exactly the error taxonomy in the subsystem's error-handling
/// design: each variant names when it is signaled and carries just enough context to
/// explain itself in a log line or to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewaySyncError {
    /// The identity provider's token endpoint rejected the gateway's credentials.
    #[error("authentication failed for gateway {gateway_id}")]
    AuthFailed {
        /// The gateway asset id whose credentials were rejected.
        gateway_id: String,
    },

    /// The channel dropped while a request or the connector was awaiting activity.
    #[error("channel disconnected")]
    Disconnected,

    /// A request's deadline elapsed before a matching response arrived.
    #[error("request {message_id} timed out")]
    Timeout {
        /// The message id of the request that timed out.
        message_id: String,
    },

    /// A frame was malformed or misused a reserved message id. An unrecognized
    /// `eventType` discriminator is not a violation on its own — it decodes to
    /// [`SharedEvent::Unknown`](crate::model::SharedEvent::Unknown) and is logged and
    /// dropped by the caller instead.
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        /// Human-readable description of the violation.
        reason: String,
    },

    /// A local mutation targeted a mirrored asset while its gateway was not connected.
    #[error("gateway {gateway_id} is not connected")]
    GatewayNotConnected {
        /// The gateway asset id that is not currently connected.
        gateway_id: String,
    },

    /// A local mutation attempted to bypass the connector's forwarding path.
    #[error("unsupported operation on mirrored asset {asset_id}")]
    UnsupportedOperation {
        /// The mirrored asset id the caller attempted to mutate directly.
        asset_id: String,
    },

    /// Two distinct local ids mapped to the same mirrored id under one gateway.
    #[error("duplicate id mapping for mirrored asset {mirrored_id}")]
    DuplicateMapping {
        /// The mirrored id that collided.
        mirrored_id: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewaySyncError>;
