//! Application-channel message envelope and typed message set
//!
//! All traffic on the open data channel is a JSON envelope
//! `{type, senderId, ...payload}` over a closed message set. The tagged
//! representation keeps the wire self-describing while dispatch stays a
//! plain `match` over [`AppMessage`].

use serde::{Deserialize, Serialize};

use crate::board::{ChunkCell, Difficulty, ScalarConfig};
use crate::errors::Result;
use crate::types::{GridPos, PeerIdentity};

// ----------------------------------------------------------------------------
// Board Chunk
// ----------------------------------------------------------------------------

/// One bounded slice of the board, tagged with its position in the
/// transfer. Carries only revealed/flagged bits; mine identity is
/// withheld until the mine-locations message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardChunk {
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub cells: Vec<ChunkCell>,
    /// Set on chunks retransmitted through the repair path.
    #[serde(default, skip_serializing_if = "is_false")]
    pub resend: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ----------------------------------------------------------------------------
// Message Set
// ----------------------------------------------------------------------------

/// Closed set of application messages carried over the data channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AppMessage {
    // Sync path
    StateConfiguration(ScalarConfig),
    BoardChunk(BoardChunk),
    #[serde(rename_all = "camelCase")]
    MineLocations { mine_locations: Vec<GridPos> },
    #[serde(rename_all = "camelCase")]
    RequestMissingChunks { missing_chunks: Vec<u32> },

    // Gameplay path
    CellReveal { row: u16, col: u16 },
    CellFlag { row: u16, col: u16 },
    CursorHint { row: u16, col: u16 },

    // Control path
    NewGame { difficulty: Difficulty },
    #[serde(rename_all = "camelCase")]
    TimerSync { elapsed_seconds: u64 },
    GameOver { won: bool },
    Reset,
    DifficultyChange { difficulty: Difficulty },
}

/// Coarse routing class for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Control,
    Gameplay,
    Sync,
}

impl AppMessage {
    /// Wire tag, matching the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppMessage::StateConfiguration(_) => "state-configuration",
            AppMessage::BoardChunk(_) => "board-chunk",
            AppMessage::MineLocations { .. } => "mine-locations",
            AppMessage::RequestMissingChunks { .. } => "request-missing-chunks",
            AppMessage::CellReveal { .. } => "cell-reveal",
            AppMessage::CellFlag { .. } => "cell-flag",
            AppMessage::CursorHint { .. } => "cursor-hint",
            AppMessage::NewGame { .. } => "new-game",
            AppMessage::TimerSync { .. } => "timer-sync",
            AppMessage::GameOver { .. } => "game-over",
            AppMessage::Reset => "reset",
            AppMessage::DifficultyChange { .. } => "difficulty-change",
        }
    }

    pub fn class(&self) -> MessageClass {
        match self {
            AppMessage::StateConfiguration(_)
            | AppMessage::BoardChunk(_)
            | AppMessage::MineLocations { .. }
            | AppMessage::RequestMissingChunks { .. } => MessageClass::Sync,
            AppMessage::CellReveal { .. }
            | AppMessage::CellFlag { .. }
            | AppMessage::CursorHint { .. } => MessageClass::Gameplay,
            AppMessage::NewGame { .. }
            | AppMessage::TimerSync { .. }
            | AppMessage::GameOver { .. }
            | AppMessage::Reset
            | AppMessage::DifficultyChange { .. } => MessageClass::Control,
        }
    }

    /// Whether only the host may originate this message. The repair
    /// request travels follower-to-host and gameplay flows both ways;
    /// everything state-bearing comes from the host alone.
    pub fn requires_host_authority(&self) -> bool {
        matches!(
            self,
            AppMessage::StateConfiguration(_)
                | AppMessage::BoardChunk(_)
                | AppMessage::MineLocations { .. }
                | AppMessage::NewGame { .. }
                | AppMessage::TimerSync { .. }
                | AppMessage::GameOver { .. }
                | AppMessage::Reset
                | AppMessage::DifficultyChange { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// Wire envelope: message payload plus the sender's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "senderId")]
    pub sender: PeerIdentity,
    #[serde(flatten)]
    pub message: AppMessage,
}

impl Envelope {
    pub fn new(sender: PeerIdentity, message: AppMessage) -> Self {
        Self { sender, message }
    }

    /// Encode for the data channel.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a received frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
