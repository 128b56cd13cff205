//! Core types for the Minemesh session layer
//!
//! This module defines the fundamental identifiers and coordinates used
//! throughout the protocol, using newtype patterns for semantic validation
//! and type safety.

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Peer Identity
// ----------------------------------------------------------------------------

/// Opaque, locally generated identifier for a participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an identity received from a remote participant.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Roles
// ----------------------------------------------------------------------------

/// Which side of the pairwise session this participant plays.
///
/// The host is authoritative for game start, mine placement, and periodic
/// timer broadcasts; the follower applies host-originated events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    /// Initiator; authoritative for game state.
    Host,
    /// Responder; non-authoritative.
    Follower,
}

impl PeerRole {
    pub fn is_host(&self) -> bool {
        matches!(self, PeerRole::Host)
    }
}

// ----------------------------------------------------------------------------
// Grid Coordinates
// ----------------------------------------------------------------------------

/// A board coordinate in row-major space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub row: u16,
    pub col: u16,
}

impl GridPos {
    pub fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }

    /// Row-major linear index for a board with `cols` columns.
    pub fn index(&self, cols: u16) -> usize {
        self.row as usize * cols as usize + self.col as usize
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// ----------------------------------------------------------------------------
// Client Tag
// ----------------------------------------------------------------------------

/// Identifies the client build that produced a negotiation payload.
/// Carried for diagnostics only; never interpreted by the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientTag(String);

impl ClientTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientTag {
    fn default() -> Self {
        Self(format!("minemesh/{}", env!("CARGO_PKG_VERSION")))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_identity_uniqueness() {
        let a = PeerIdentity::generate();
        let b = PeerIdentity::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn test_grid_pos_index() {
        let pos = GridPos::new(2, 3);
        assert_eq!(pos.index(9), 21);
        assert_eq!(GridPos::new(0, 0).index(9), 0);
        assert_eq!(GridPos::new(8, 8).index(9), 80);
    }

    #[test]
    fn test_peer_identity_serde_transparent() {
        let id = PeerIdentity::from_string("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
