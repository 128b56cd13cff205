//! Channel health monitoring and recovery
//!
//! A periodic poll of the connector's link and channel state feeds a
//! pure decision core. The host reacts to a lost channel by requesting
//! renegotiation up to a retry cap; a follower can only surface that a
//! manual rejoin is needed, since renegotiation is host-initiated.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::negotiation::{ChannelState, LinkState, PeerConnector};
use crate::types::PeerRole;

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// User-visible notices emitted by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ConnectionUnstable { attempt: u32 },
    ConnectionRegained,
    RejoinRequired,
    ConnectionLost,
    SyncComplete,
}

/// Sink for user-facing notices. The session layer never renders UI;
/// it hands notices to whatever surface the embedder provides.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default sink that routes notices into the log stream.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::ConnectionUnstable { attempt } => {
                warn!(attempt, "connection unstable, attempting recovery")
            }
            Notice::ConnectionRegained => info!("connection regained"),
            Notice::RejoinRequired => warn!("connection lost, manual rejoin required"),
            Notice::ConnectionLost => warn!("connection lost"),
            Notice::SyncComplete => info!("state sync complete"),
        }
    }
}

// ----------------------------------------------------------------------------
// Decision Core
// ----------------------------------------------------------------------------

/// Snapshot of the transport as seen at one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedState {
    pub link: LinkState,
    pub channel: ChannelState,
}

impl ObservedState {
    pub fn healthy(&self) -> bool {
        self.channel == ChannelState::Open
            && !matches!(self.link, LinkState::Failed | LinkState::Closed)
    }
}

/// What the monitor decided to do about one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorVerdict {
    /// Healthy, nothing to do.
    Stable,
    /// Healthy again after a degraded stretch.
    Regained,
    /// Host should issue recovery attempt `attempt` of the retry cap.
    Recover { attempt: u32 },
    /// Follower-side loss already reported; nothing new to say.
    AwaitingRecovery,
    /// Follower-side loss, the user has to rejoin through the host.
    ManualRejoinRequired,
    /// Retry cap exhausted.
    GiveUp,
}

/// Pure retry-tracking core, one per session generation.
#[derive(Debug)]
pub struct ChannelMonitor {
    role: PeerRole,
    max_retries: u32,
    attempts: u32,
    degraded: bool,
}

impl ChannelMonitor {
    pub fn new(role: PeerRole, max_retries: u32) -> Self {
        Self {
            role,
            max_retries,
            attempts: 0,
            degraded: false,
        }
    }

    pub fn observe(&mut self, observed: &ObservedState) -> MonitorVerdict {
        if observed.healthy() {
            if self.degraded {
                self.degraded = false;
                self.attempts = 0;
                MonitorVerdict::Regained
            } else {
                MonitorVerdict::Stable
            }
        } else if !self.role.is_host() {
            if self.degraded {
                MonitorVerdict::AwaitingRecovery
            } else {
                self.degraded = true;
                MonitorVerdict::ManualRejoinRequired
            }
        } else {
            self.degraded = true;
            if self.attempts >= self.max_retries {
                MonitorVerdict::GiveUp
            } else {
                self.attempts += 1;
                MonitorVerdict::Recover {
                    attempt: self.attempts,
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Driver
// ----------------------------------------------------------------------------

/// Recovery signals for the layer that owns the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Host should renegotiate; `attempt` is 1-based.
    RecoveryNeeded { attempt: u32 },
    Regained,
    ManualRejoinRequired,
    ConnectionLost,
}

/// Poll the connector until shutdown, the retry cap, or a dropped
/// event receiver. One driver task per session generation; the
/// shutdown receiver comes from that generation's session, so a
/// replaced session cannot keep its old monitor alive.
pub async fn run_monitor(
    connector: Arc<dyn PeerConnector>,
    role: PeerRole,
    config: MonitorConfig,
    notifier: Arc<dyn Notifier>,
    events: mpsc::Sender<MonitorEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut monitor = ChannelMonitor::new(role, config.max_retries);
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                // A dropped sender means the session is gone.
                if changed.is_err() || *shutdown.borrow() {
                    debug!("monitor shut down");
                    return;
                }
                continue;
            }
        }

        let observed = ObservedState {
            link: connector.link_state(),
            channel: connector.channel_state(),
        };
        match monitor.observe(&observed) {
            MonitorVerdict::Stable | MonitorVerdict::AwaitingRecovery => {}
            MonitorVerdict::Regained => {
                notifier.notify(Notice::ConnectionRegained);
                if events.send(MonitorEvent::Regained).await.is_err() {
                    return;
                }
            }
            MonitorVerdict::Recover { attempt } => {
                notifier.notify(Notice::ConnectionUnstable { attempt });
                if events
                    .send(MonitorEvent::RecoveryNeeded { attempt })
                    .await
                    .is_err()
                {
                    return;
                }
                // Give the recovery attempt room before re-checking.
                tokio::select! {
                    _ = tokio::time::sleep(config.retry_backoff) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
            MonitorVerdict::ManualRejoinRequired => {
                notifier.notify(Notice::RejoinRequired);
                if events.send(MonitorEvent::ManualRejoinRequired).await.is_err() {
                    return;
                }
            }
            MonitorVerdict::GiveUp => {
                notifier.notify(Notice::ConnectionLost);
                let _ = events.send(MonitorEvent::ConnectionLost).await;
                return;
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
