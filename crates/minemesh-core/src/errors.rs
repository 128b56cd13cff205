//! Error types for the Minemesh session layer
//!
//! Each protocol concern carries its own error enum; `MinemeshError`
//! unifies them for callers that cross concern boundaries. Negotiation
//! and candidate errors are logged and non-fatal by policy; only retry
//! exhaustion and assembly structural errors surface to the user.

use crate::types::PeerIdentity;

// ----------------------------------------------------------------------------
// Negotiation Errors
// ----------------------------------------------------------------------------

/// Errors raised while establishing a session. Candidate-application
/// failures are logged and the candidate dropped; they never propagate
/// as fatal failures.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("session with peer {peer} is not idle ({state}); tear it down first")]
    SessionBusy { peer: PeerIdentity, state: &'static str },

    #[error("malformed session description: {reason}")]
    MalformedDescription { reason: String },

    #[error("candidate rejected: {reason}")]
    CandidateRejected { reason: String },

    #[error("negotiation step out of order: {reason}")]
    OutOfOrder { reason: String },
}

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Channel-level failures. `Degraded` is transient and drives monitor
/// recovery; `Closed` is terminal and requires an explicit re-host or
/// re-join by the user.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel degraded: {reason}")]
    Degraded { reason: String },

    #[error("channel closed: {reason}")]
    Closed { reason: String },

    #[error("channel is not open")]
    NotOpen,
}

// ----------------------------------------------------------------------------
// Sync Errors
// ----------------------------------------------------------------------------

/// State-transfer failures. Structural assembly errors are user-visible
/// and require a manual rejoin; there is no automatic retry.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("snapshot assembly failed: {reason}")]
    Assembly { reason: String },

    #[error("chunk index {index} out of range (total {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("chunk count mismatch: expected {expected}, message claims {actual}")]
    ChunkCountMismatch { expected: u32, actual: u32 },

    #[error("no state transfer in progress")]
    NoPendingSync,
}

// ----------------------------------------------------------------------------
// Board Errors
// ----------------------------------------------------------------------------

/// Structural failures in board data.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("cell ({row}, {col}) out of bounds for {rows}x{cols} board")]
    OutOfBounds { row: u16, col: u16, rows: u16, cols: u16 },

    #[error("snapshot dimensions {rows}x{cols} do not match cell count {cells}")]
    DimensionMismatch { rows: u16, cols: u16, cells: usize },
}

// ----------------------------------------------------------------------------
// Router Errors
// ----------------------------------------------------------------------------

/// Dispatch failures for inbound application messages.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("message '{kind}' requires host authority; sender {sender} is not the host")]
    NotAuthorized { kind: &'static str, sender: PeerIdentity },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error type for the Minemesh session layer.
#[derive(Debug, thiserror::Error)]
pub enum MinemeshError {
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("board error: {0}")]
    Board(#[from] BoardError),

    #[error("router error: {0}")]
    Router(#[from] RouterError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel error: {message}")]
    Channel { message: String },
}

impl MinemeshError {
    /// Create a channel error with a message.
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        MinemeshError::Channel {
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, MinemeshError>;
