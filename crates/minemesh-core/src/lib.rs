//! minemesh-core: peer-to-peer session layer for two-player minesweeper
//!
//! This crate owns everything between the signaling exchange and the
//! game UI: offer/answer negotiation with candidate buffering, channel
//! health monitoring with host-driven recovery, chunked full-state
//! sync with a repair path, and typed dispatch of gameplay and control
//! messages. It is engine-agnostic; concrete transports implement
//! [`PeerConnector`] and [`DataChannel`].

pub mod board;
pub mod candidate;
pub mod channel;
pub mod config;
pub mod errors;
pub mod message;
pub mod monitor;
pub mod negotiation;
pub mod router;
pub mod sync;
pub mod types;

pub use board::{
    BoardConfig, BoardSnapshot, CellState, ChunkCell, Difficulty, GameStateStore, MemoryBoard,
    ScalarConfig,
};
pub use candidate::{CandidateBuffer, ConnectivityCandidate};
pub use channel::DataChannel;
pub use config::{MonitorConfig, NegotiationConfig, SessionConfig, SyncConfig};
pub use errors::{MinemeshError, Result};
pub use message::{AppMessage, BoardChunk, Envelope, MessageClass};
pub use monitor::{
    run_monitor, ChannelMonitor, MonitorEvent, MonitorVerdict, Notice, Notifier, ObservedState,
    TracingNotifier,
};
pub use negotiation::{
    ChannelState, ConnectionSession, GatheringEvent, LinkState, NegotiationPayload, PayloadKind,
    PeerConnector, SessionDescription, SessionManager, SessionState,
};
pub use router::{ControlEvents, MessageRouter};
pub use sync::{chunk_cells, Announcement, PendingSync, StateAnnouncer, StateSync};
pub use types::{ClientTag, GridPos, PeerIdentity, PeerRole};
