//! Centralized Configuration Management
//!
//! Consolidates the tunables for negotiation, channel monitoring, and
//! state synchronization into one session-level configuration.

use core::time::Duration;

use crate::types::ClientTag;

// ----------------------------------------------------------------------------
// Negotiation Configuration
// ----------------------------------------------------------------------------

/// Configuration for session negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Soft deadline for candidate gathering. `begin_*` resolves with
    /// whatever candidates were collected once this elapses.
    pub gather_deadline: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            gather_deadline: Duration::from_secs(10),
        }
    }
}

// ----------------------------------------------------------------------------
// Monitor Configuration
// ----------------------------------------------------------------------------

/// Configuration for channel health monitoring and recovery.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often observed transport state is compared to believed state.
    pub poll_interval: Duration,
    /// Fixed backoff before each reconnection attempt.
    pub retry_backoff: Duration,
    /// Reconnection attempts before the session closes permanently.
    pub max_retries: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

// ----------------------------------------------------------------------------
// Sync Configuration
// ----------------------------------------------------------------------------

/// Configuration for full-board state transfer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cells per board chunk message.
    pub chunk_size: usize,
    /// Delay after the channel opens before a transfer begins, giving
    /// the far side time to wire up its receive path.
    pub settle_delay: Duration,
    /// Delay between resent chunks so repair traffic does not saturate
    /// the channel.
    pub resend_stagger: Duration,
    /// How long an incomplete transfer may sit without new sync traffic
    /// before the follower requests its missing chunks.
    pub missing_chunk_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            settle_delay: Duration::from_millis(500),
            resend_stagger: Duration::from_millis(100),
            missing_chunk_timeout: Duration::from_secs(5),
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Top-level configuration for one peer session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub negotiation: NegotiationConfig,
    pub monitor: MonitorConfig,
    pub sync: SyncConfig,
    pub client_tag: ClientTag,
}

impl SessionConfig {
    /// Create a configuration with short intervals for testing.
    pub fn testing() -> Self {
        Self {
            negotiation: NegotiationConfig {
                gather_deadline: Duration::from_millis(100),
            },
            monitor: MonitorConfig {
                poll_interval: Duration::from_millis(20),
                retry_backoff: Duration::from_millis(10),
                max_retries: 3,
            },
            sync: SyncConfig {
                chunk_size: 50,
                settle_delay: Duration::from_millis(5),
                resend_stagger: Duration::from_millis(2),
                missing_chunk_timeout: Duration::from_millis(50),
            },
            client_tag: ClientTag::new("minemesh/test"),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
