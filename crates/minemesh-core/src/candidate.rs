//! Connectivity candidate buffering
//!
//! Candidates discovered before the remote description lands cannot be
//! applied yet. The buffer holds them in arrival order and releases the
//! whole batch exactly once, after which new candidates pass straight
//! through.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Opaque transport-level connectivity candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectivityCandidate(pub String);

impl ConnectivityCandidate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// FIFO buffer for candidates that arrive ahead of the remote
/// description. Most sessions see a handful of candidates, so the
/// backing store stays inline.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: SmallVec<[ConnectivityCandidate; 8]>,
    flushed: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the remote description is in place and buffering is
    /// no longer needed.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffer a candidate, or return it for immediate application if
    /// the buffer has already flushed.
    pub fn push(&mut self, candidate: ConnectivityCandidate) -> Option<ConnectivityCandidate> {
        if self.flushed {
            return Some(candidate);
        }
        self.pending.push(candidate);
        None
    }

    /// Release all buffered candidates in arrival order. After the
    /// first call the buffer is a pass-through; repeat calls return an
    /// empty batch.
    pub fn flush(&mut self) -> Vec<ConnectivityCandidate> {
        self.flushed = true;
        self.pending.drain(..).collect()
    }

    /// Drop buffered state and return to buffering mode, for a fresh
    /// negotiation on the same peer.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.flushed = false;
    }
}
