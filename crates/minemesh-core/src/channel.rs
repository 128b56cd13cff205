//! Data channel abstraction
//!
//! The session layer never talks to a concrete transport directly. A
//! [`DataChannel`] is anything that can frame an [`Envelope`] out to the
//! remote peer and report per-message delivery. Real bindings live in
//! their own crates; tests use the in-memory pair from the harness.

use async_trait::async_trait;

use crate::errors::Result;
use crate::message::Envelope;

/// Outbound half of an open application channel.
///
/// `send` distinguishes two failure shapes: `Ok(false)` means the
/// channel accepted the call but could not deliver this message (the
/// caller may retry or drop it), while `Err(_)` means the channel
/// itself is unusable.
#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<bool>;

    /// Whether the underlying channel is currently open for traffic.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every envelope handed to `send`; optionally refuses
    /// delivery without erroring.
    pub struct RecordingChannel {
        pub sent: Mutex<Vec<Envelope>>,
        pub deliver: AtomicBool,
        pub open: AtomicBool,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                deliver: AtomicBool::new(true),
                open: AtomicBool::new(true),
            }
        }

        pub fn sent_messages(&self) -> Vec<Envelope> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DataChannel for RecordingChannel {
        async fn send(&self, envelope: &Envelope) -> Result<bool> {
            if !self.deliver.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.sent.lock().unwrap().push(envelope.clone());
            Ok(true)
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }
}
