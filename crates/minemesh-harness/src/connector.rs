//! Scriptable in-memory connection engine

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use minemesh_core::errors::Result;
use minemesh_core::negotiation::{
    ChannelState, GatheringEvent, LinkState, PeerConnector, SessionDescription,
};
use minemesh_core::ConnectivityCandidate;
use tracing::debug;

/// Shared handle for flipping the simulated link and channel state
/// from a test while a session or monitor holds the connector.
#[derive(Debug)]
pub struct LinkControl {
    link: Mutex<LinkState>,
    channel: Mutex<ChannelState>,
}

impl LinkControl {
    fn new() -> Self {
        Self {
            link: Mutex::new(LinkState::New),
            channel: Mutex::new(ChannelState::Connecting),
        }
    }

    pub fn set_link(&self, state: LinkState) {
        *self.link.lock().unwrap() = state;
    }

    pub fn set_channel(&self, state: ChannelState) {
        *self.channel.lock().unwrap() = state;
    }

    pub fn link(&self) -> LinkState {
        *self.link.lock().unwrap()
    }

    pub fn channel(&self) -> ChannelState {
        *self.channel.lock().unwrap()
    }
}

/// Connection engine whose candidate gathering is scripted up front.
/// Applying either remote description marks the link connected and the
/// channel open, which is the happy path of a direct connection.
pub struct MemoryConnector {
    gathering: Mutex<VecDeque<GatheringEvent>>,
    applied: Mutex<Vec<ConnectivityCandidate>>,
    control: Arc<LinkControl>,
}

impl MemoryConnector {
    pub fn new(candidates: Vec<ConnectivityCandidate>) -> Self {
        let mut gathering: VecDeque<GatheringEvent> = candidates
            .into_iter()
            .map(GatheringEvent::Candidate)
            .collect();
        gathering.push_back(GatheringEvent::Complete);
        Self {
            gathering: Mutex::new(gathering),
            applied: Mutex::new(Vec::new()),
            control: Arc::new(LinkControl::new()),
        }
    }

    pub fn control(&self) -> Arc<LinkControl> {
        Arc::clone(&self.control)
    }

    /// Remote candidates applied so far, in application order.
    pub fn applied_candidates(&self) -> Vec<ConnectivityCandidate> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnector for MemoryConnector {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.control.set_link(LinkState::Checking);
        Ok(SessionDescription::offer("memory-offer"))
    }

    async fn accept_offer(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        debug!(body = %offer.body, "accepting offer");
        self.control.set_link(LinkState::Connected);
        self.control.set_channel(ChannelState::Open);
        Ok(SessionDescription::answer(format!("answer-to:{}", offer.body)))
    }

    async fn accept_answer(&self, answer: &SessionDescription) -> Result<()> {
        debug!(body = %answer.body, "accepting answer");
        self.control.set_link(LinkState::Connected);
        self.control.set_channel(ChannelState::Open);
        Ok(())
    }

    async fn add_candidate(&self, candidate: &ConnectivityCandidate) -> Result<()> {
        self.applied.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn next_gathering_event(&self) -> Option<GatheringEvent> {
        self.gathering.lock().unwrap().pop_front()
    }

    fn link_state(&self) -> LinkState {
        self.control.link()
    }

    fn channel_state(&self) -> ChannelState {
        self.control.channel()
    }

    async fn close(&self) {
        self.control.set_link(LinkState::Closed);
        self.control.set_channel(ChannelState::Closed);
    }
}
