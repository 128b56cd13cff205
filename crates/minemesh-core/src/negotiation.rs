//! Connection negotiation
//!
//! Drives the offer/answer exchange for a single remote peer over an
//! engine-agnostic [`PeerConnector`]. Candidate gathering runs under a
//! fixed deadline and resolves with whatever arrived; candidates from
//! the remote side are buffered until its description is in place, then
//! released in arrival order exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::candidate::{CandidateBuffer, ConnectivityCandidate};
use crate::config::SessionConfig;
use crate::errors::{NegotiationError, Result};
use crate::types::{ClientTag, PeerIdentity, PeerRole};

// ----------------------------------------------------------------------------
// Descriptions and Payloads
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadKind {
    Offer,
    Answer,
}

/// Engine-level session description, opaque to this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: PayloadKind,
    pub body: String,
}

impl SessionDescription {
    pub fn offer(body: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Offer,
            body: body.into(),
        }
    }

    pub fn answer(body: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Answer,
            body: body.into(),
        }
    }
}

/// Everything one side sends through the signaling path in a single
/// exchange: who is talking, the description, and the candidates
/// gathered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationPayload {
    pub kind: PayloadKind,
    pub peer_id: PeerIdentity,
    pub description: SessionDescription,
    pub candidates: Vec<ConnectivityCandidate>,
    pub client_tag: ClientTag,
}

// ----------------------------------------------------------------------------
// Connector Seam
// ----------------------------------------------------------------------------

/// Transport-level link condition as last reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Checking,
    Connected,
    Degraded,
    Failed,
    Closed,
}

/// State of the application data channel riding on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Candidate discovery events surfaced by the engine during gathering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatheringEvent {
    Candidate(ConnectivityCandidate),
    Complete,
}

/// Seam to the underlying connection engine. One connector instance
/// backs one negotiation generation; a renegotiation reuses the same
/// connector, a replaced session gets a fresh one.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Create a local offer and start candidate gathering.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply a remote offer and produce the local answer, starting
    /// candidate gathering for it.
    async fn accept_offer(&self, offer: &SessionDescription) -> Result<SessionDescription>;

    /// Apply the remote answer to a previously created offer.
    async fn accept_answer(&self, answer: &SessionDescription) -> Result<()>;

    /// Apply a remote connectivity candidate.
    async fn add_candidate(&self, candidate: &ConnectivityCandidate) -> Result<()>;

    /// Next gathering event, or `None` once the engine is done
    /// producing them.
    async fn next_gathering_event(&self) -> Option<GatheringEvent>;

    fn link_state(&self) -> LinkState;

    fn channel_state(&self) -> ChannelState;

    async fn close(&self);
}

// ----------------------------------------------------------------------------
// Connection Session
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingAnswer,
    Connected,
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingAnswer => "awaiting-answer",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        }
    }
}

/// One negotiation generation against one remote peer.
pub struct ConnectionSession {
    local: PeerIdentity,
    peer: PeerIdentity,
    role: PeerRole,
    connector: Arc<dyn PeerConnector>,
    config: SessionConfig,
    buffer: CandidateBuffer,
    state: SessionState,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionSession {
    pub fn new(
        local: PeerIdentity,
        peer: PeerIdentity,
        role: PeerRole,
        connector: Arc<dyn PeerConnector>,
        config: SessionConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            local,
            peer,
            role,
            connector,
            config,
            buffer: CandidateBuffer::new(),
            state: SessionState::Idle,
            shutdown_tx,
        }
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connector(&self) -> Arc<dyn PeerConnector> {
        Arc::clone(&self.connector)
    }

    /// Receiver that flips to `true` when this session generation shuts
    /// down. Background tasks tied to the session watch this so a
    /// replacement session never inherits their effects.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Host side: create the offer and gather candidates for it.
    pub async fn begin_as_host(&mut self) -> Result<NegotiationPayload> {
        self.require_idle()?;
        let description = self.connector.create_offer().await?;
        let candidates = self.gather_candidates().await;
        self.state = SessionState::AwaitingAnswer;
        info!(peer = %self.peer, candidates = candidates.len(), "offer ready");
        Ok(self.payload(PayloadKind::Offer, description, candidates))
    }

    /// Follower side: apply a received offer and produce the answer.
    pub async fn begin_as_peer(&mut self, offer: &NegotiationPayload) -> Result<NegotiationPayload> {
        self.require_idle()?;
        if offer.kind != PayloadKind::Offer {
            return Err(NegotiationError::MalformedDescription {
                reason: "expected an offer payload".into(),
            }
            .into());
        }
        let description = self.connector.accept_offer(&offer.description).await?;
        self.release_buffered().await;
        for candidate in &offer.candidates {
            self.apply_candidate(candidate).await;
        }
        let candidates = self.gather_candidates().await;
        self.state = SessionState::Connected;
        info!(peer = %self.peer, candidates = candidates.len(), "answer ready");
        Ok(self.payload(PayloadKind::Answer, description, candidates))
    }

    /// Host side: apply the remote answer, completing negotiation.
    pub async fn complete_as_host(&mut self, answer: &NegotiationPayload) -> Result<()> {
        self.require_state(SessionState::AwaitingAnswer, "answer before offer")?;
        if answer.kind != PayloadKind::Answer {
            return Err(NegotiationError::MalformedDescription {
                reason: "expected an answer payload".into(),
            }
            .into());
        }
        self.connector.accept_answer(&answer.description).await?;
        self.release_buffered().await;
        for candidate in &answer.candidates {
            self.apply_candidate(candidate).await;
        }
        self.state = SessionState::Connected;
        info!(peer = %self.peer, "negotiation complete");
        Ok(())
    }

    /// Candidate received out-of-band. Buffered until the remote
    /// description is applied, then passed straight to the engine.
    pub async fn add_remote_candidate(&mut self, candidate: ConnectivityCandidate) {
        match self.buffer.push(candidate) {
            Some(ready) => self.apply_candidate(&ready).await,
            None => {
                debug!(peer = %self.peer, buffered = self.buffer.len(), "candidate buffered");
            }
        }
    }

    /// Host side: fresh offer over the existing connector after the
    /// channel was lost.
    pub async fn begin_renegotiation(&mut self) -> Result<NegotiationPayload> {
        if !self.role.is_host() {
            return Err(NegotiationError::OutOfOrder {
                reason: "renegotiation is initiated by the host".into(),
            }
            .into());
        }
        if self.state == SessionState::Closed {
            return Err(NegotiationError::OutOfOrder {
                reason: "renegotiation on a closed session".into(),
            }
            .into());
        }
        self.buffer.reset();
        let description = self.connector.create_offer().await?;
        let candidates = self.gather_candidates().await;
        self.state = SessionState::AwaitingAnswer;
        info!(peer = %self.peer, "renegotiation offer ready");
        Ok(self.payload(PayloadKind::Offer, description, candidates))
    }

    /// Follower side: apply a renegotiation offer on the existing
    /// connector and answer it. Valid once the session has connected.
    pub async fn accept_renegotiation(
        &mut self,
        offer: &NegotiationPayload,
    ) -> Result<NegotiationPayload> {
        self.require_state(SessionState::Connected, "renegotiation before connecting")?;
        if offer.kind != PayloadKind::Offer {
            return Err(NegotiationError::MalformedDescription {
                reason: "expected an offer payload".into(),
            }
            .into());
        }
        self.buffer.reset();
        let description = self.connector.accept_offer(&offer.description).await?;
        // Description applied, so trickled candidates bypass the buffer.
        self.buffer.flush();
        for candidate in &offer.candidates {
            self.apply_candidate(candidate).await;
        }
        let candidates = self.gather_candidates().await;
        info!(peer = %self.peer, "renegotiation answer ready");
        Ok(self.payload(PayloadKind::Answer, description, candidates))
    }

    pub fn link_state(&self) -> LinkState {
        self.connector.link_state()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.connector.channel_state()
    }

    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        let _ = self.shutdown_tx.send(true);
        self.connector.close().await;
        info!(peer = %self.peer, "session closed");
    }

    /// Collect candidates until the engine reports completion or the
    /// gather deadline elapses, whichever comes first. A deadline hit
    /// is not an error; negotiation proceeds with what arrived.
    async fn gather_candidates(&self) -> Vec<ConnectivityCandidate> {
        let deadline = tokio::time::Instant::now() + self.config.negotiation.gather_deadline;
        let mut collected = Vec::new();
        loop {
            let event = tokio::select! {
                event = self.connector.next_gathering_event() => event,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        peer = %self.peer,
                        collected = collected.len(),
                        "gather deadline reached, continuing with partial set"
                    );
                    break;
                }
            };
            match event {
                Some(GatheringEvent::Candidate(candidate)) => collected.push(candidate),
                Some(GatheringEvent::Complete) | None => break,
            }
        }
        collected
    }

    /// Hand a candidate to the engine. A rejection is logged and the
    /// candidate dropped; negotiation carries on with the rest.
    async fn apply_candidate(&self, candidate: &ConnectivityCandidate) {
        if let Err(error) = self.connector.add_candidate(candidate).await {
            warn!(peer = %self.peer, %error, "candidate rejected, dropping");
        }
    }

    async fn release_buffered(&mut self) {
        let released = self.buffer.flush();
        if !released.is_empty() {
            debug!(peer = %self.peer, count = released.len(), "releasing buffered candidates");
        }
        for candidate in released {
            self.apply_candidate(&candidate).await;
        }
    }

    fn require_state(&self, expected: SessionState, context: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(NegotiationError::OutOfOrder {
                reason: format!("{context} (state {:?})", self.state),
            }
            .into())
        }
    }

    fn require_idle(&self) -> Result<()> {
        if self.state == SessionState::Idle {
            Ok(())
        } else {
            Err(NegotiationError::SessionBusy {
                peer: self.peer.clone(),
                state: self.state.name(),
            }
            .into())
        }
    }

    fn payload(
        &self,
        kind: PayloadKind,
        description: SessionDescription,
        candidates: Vec<ConnectivityCandidate>,
    ) -> NegotiationPayload {
        NegotiationPayload {
            kind,
            peer_id: self.local.clone(),
            description,
            candidates,
            client_tag: self.config.client_tag.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Owns at most one [`ConnectionSession`] per remote peer. Opening a
/// session for a peer that already has one tears the old one down
/// first, so stale background work cannot bleed into the new
/// generation.
pub struct SessionManager {
    local: PeerIdentity,
    sessions: HashMap<PeerIdentity, ConnectionSession>,
}

impl SessionManager {
    pub fn new(local: PeerIdentity) -> Self {
        Self {
            local,
            sessions: HashMap::new(),
        }
    }

    pub async fn open_session(
        &mut self,
        peer: PeerIdentity,
        role: PeerRole,
        connector: Arc<dyn PeerConnector>,
        config: SessionConfig,
    ) -> &mut ConnectionSession {
        if let Some(mut previous) = self.sessions.remove(&peer) {
            warn!(peer = %peer, "replacing existing session");
            previous.close().await;
        }
        let session =
            ConnectionSession::new(self.local.clone(), peer.clone(), role, connector, config);
        self.sessions.entry(peer).or_insert(session)
    }

    pub fn session_mut(&mut self, peer: &PeerIdentity) -> Option<&mut ConnectionSession> {
        self.sessions.get_mut(peer)
    }

    pub async fn close_session(&mut self, peer: &PeerIdentity) {
        if let Some(mut session) = self.sessions.remove(peer) {
            session.close().await;
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close().await;
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
