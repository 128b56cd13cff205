//! Paired in-memory data channel with fault injection
//!
//! `channel_pair` wires two endpoints back to back: what one side
//! sends shows up in the other side's inbox. Tests can make delivery
//! fail loudly (`fail_next`), drop messages silently by kind to mimic
//! a lossy network, or close the channel outright.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use minemesh_core::errors::{Result, TransportError};
use minemesh_core::{DataChannel, Envelope};
use tokio::sync::mpsc;
use tracing::trace;

pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<Envelope>,
    open: Arc<AtomicBool>,
    fail_budget: AtomicUsize,
    drop_kinds: Mutex<HashSet<&'static str>>,
    dropped: AtomicUsize,
}

impl MemoryChannel {
    /// Report delivery failure for the next `count` sends.
    pub fn fail_next(&self, count: usize) {
        self.fail_budget.store(count, Ordering::SeqCst);
    }

    /// Silently discard messages of the given kind, as a lossy network
    /// would. The sender still sees successful delivery.
    pub fn drop_kind(&self, kind: &'static str) {
        self.drop_kinds.lock().unwrap().insert(kind);
    }

    pub fn clear_drops(&self) {
        self.drop_kinds.lock().unwrap().clear();
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Close or reopen both directions of this endpoint.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataChannel for MemoryChannel {
    async fn send(&self, envelope: &Envelope) -> Result<bool> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen.into());
        }
        if self
            .fail_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }
        if self
            .drop_kinds
            .lock()
            .unwrap()
            .contains(envelope.message.kind())
        {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            trace!(kind = envelope.message.kind(), "dropping message");
            return Ok(true);
        }
        self.outbound
            .send(envelope.clone())
            .map_err(|_| TransportError::Closed {
                reason: "peer inbox closed".into(),
            })?;
        Ok(true)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// One side of a paired channel: the sending half plus the inbox of
/// everything the other side delivered.
pub struct ChannelEndpoint {
    pub channel: MemoryChannel,
    pub inbox: mpsc::UnboundedReceiver<Envelope>,
}

impl ChannelEndpoint {
    /// Drain everything currently in the inbox without waiting.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut messages = Vec::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            messages.push(envelope);
        }
        messages
    }
}

pub fn channel_pair() -> (ChannelEndpoint, ChannelEndpoint) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));

    let make = |outbound: mpsc::UnboundedSender<Envelope>,
                inbox: mpsc::UnboundedReceiver<Envelope>| {
        ChannelEndpoint {
            channel: MemoryChannel {
                outbound,
                open: Arc::clone(&open),
                fail_budget: AtomicUsize::new(0),
                drop_kinds: Mutex::new(HashSet::new()),
                dropped: AtomicUsize::new(0),
            },
            inbox,
        }
    };

    (make(b_tx, a_rx), make(a_tx, b_rx))
}

#[cfg(test)]
mod tests {
    use minemesh_core::{AppMessage, PeerIdentity};

    use super::*;

    fn envelope(message: AppMessage) -> Envelope {
        Envelope::new(PeerIdentity::from_string("test"), message)
    }

    #[tokio::test]
    async fn test_pair_delivers_both_directions() {
        let (mut left, mut right) = channel_pair();

        left.channel
            .send(&envelope(AppMessage::Reset))
            .await
            .unwrap();
        right
            .channel
            .send(&envelope(AppMessage::GameOver { won: true }))
            .await
            .unwrap();

        assert_eq!(right.drain().len(), 1);
        assert_eq!(left.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_budget_reports_without_delivering() {
        let (left, mut right) = channel_pair();
        left.channel.fail_next(1);

        assert!(!left.channel.send(&envelope(AppMessage::Reset)).await.unwrap());
        assert!(left.channel.send(&envelope(AppMessage::Reset)).await.unwrap());
        assert_eq!(right.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_kind_drop_is_silent() {
        let (left, mut right) = channel_pair();
        left.channel.drop_kind("reset");

        assert!(left.channel.send(&envelope(AppMessage::Reset)).await.unwrap());
        assert_eq!(left.channel.dropped_count(), 1);
        assert!(right.drain().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_errors() {
        let (left, _right) = channel_pair();
        left.channel.set_open(false);
        assert!(left.channel.send(&envelope(AppMessage::Reset)).await.is_err());
        assert!(!left.channel.is_open());
    }
}
