//! In-memory fabric for exercising the Minemesh session layer
//!
//! Provides a [`MemoryConnector`] standing in for a real connection
//! engine and a paired in-memory [`MemoryChannel`] with fault
//! injection, so full host/follower flows run in a single test process
//! with no sockets involved.

pub mod channel;
pub mod connector;

pub use channel::{channel_pair, ChannelEndpoint, MemoryChannel};
pub use connector::{LinkControl, MemoryConnector};
