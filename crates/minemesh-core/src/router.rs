//! Typed message dispatch
//!
//! One [`MessageRouter`] per session generation. It owns the local
//! board, the follower-side sync accumulator, and the host-side
//! announcer, and dispatches every inbound envelope by message type.
//! State-bearing messages are only honored from the host; replayed or
//! duplicated messages must land as no-ops.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::board::{Difficulty, GameStateStore, ScalarConfig};
use crate::channel::DataChannel;
use crate::config::SyncConfig;
use crate::errors::{Result, RouterError};
use crate::message::{AppMessage, Envelope};
use crate::monitor::{Notice, Notifier};
use crate::sync::{StateAnnouncer, StateSync};
use crate::types::{GridPos, PeerIdentity, PeerRole};

// ----------------------------------------------------------------------------
// Control Events
// ----------------------------------------------------------------------------

/// Game-level callbacks the embedder wires into the router. Board cell
/// changes are applied to the store directly; everything above the
/// board (timer, game lifecycle, remote cursor) lands here.
pub trait ControlEvents: Send {
    fn on_state_configuration(&mut self, config: &ScalarConfig);
    fn on_new_game(&mut self, difficulty: Difficulty);
    fn on_timer_sync(&mut self, elapsed_seconds: u64);
    fn on_game_over(&mut self, won: bool);
    fn on_reset(&mut self);
    fn on_difficulty_change(&mut self, difficulty: Difficulty);
    fn on_cursor_hint(&mut self, sender: &PeerIdentity, pos: GridPos);
}

// ----------------------------------------------------------------------------
// Router
// ----------------------------------------------------------------------------

pub struct MessageRouter<S, C> {
    local: PeerIdentity,
    role: PeerRole,
    store: S,
    sync: StateSync,
    announcer: StateAnnouncer,
    control: C,
    notifier: Arc<dyn Notifier>,
}

impl<S, C> MessageRouter<S, C>
where
    S: GameStateStore,
    C: ControlEvents,
{
    pub fn new(
        local: PeerIdentity,
        role: PeerRole,
        store: S,
        control: C,
        sync_config: SyncConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            announcer: StateAnnouncer::new(local.clone(), sync_config.clone()),
            sync: StateSync::new(sync_config),
            local,
            role,
            store,
            control,
            notifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Host side: push the full board to the peer.
    pub async fn announce_state(&self, channel: &dyn DataChannel) -> Result<()> {
        self.announcer.announce(channel, &self.store).await
    }

    /// Follower side: if the in-flight transfer has stalled, ask the
    /// host for what is missing. No-op on a healthy transfer.
    pub async fn poll_sync(&mut self, channel: &dyn DataChannel) -> Result<()> {
        if let Some(missing) = self.sync.check_stale() {
            let request = Envelope::new(
                self.local.clone(),
                AppMessage::RequestMissingChunks {
                    missing_chunks: missing,
                },
            );
            if !channel.send(&request).await? {
                warn!("missing-chunk request not delivered");
            }
        }
        Ok(())
    }

    /// Dispatch one inbound envelope.
    pub async fn route(&mut self, channel: &dyn DataChannel, envelope: Envelope) -> Result<()> {
        let Envelope { sender, message } = envelope;
        debug!(kind = message.kind(), sender = %sender, "routing message");

        // In a two-peer session the remote of a host is never the
        // host, so a host receiving a state-bearing message is seeing
        // either a loopback or a peer overstepping its role.
        if message.requires_host_authority() && self.role.is_host() {
            return Err(RouterError::NotAuthorized {
                kind: message.kind(),
                sender,
            }
            .into());
        }

        match message {
            AppMessage::StateConfiguration(config) => {
                self.control.on_state_configuration(&config);
                self.sync.on_configuration(config);
            }
            AppMessage::BoardChunk(chunk) => {
                self.sync.on_chunk(chunk)?;
                self.try_finish_sync()?;
            }
            AppMessage::MineLocations { mine_locations } => {
                self.sync.on_mine_locations(mine_locations)?;
                self.try_finish_sync()?;
            }
            AppMessage::RequestMissingChunks { missing_chunks } => {
                if !self.role.is_host() {
                    return Err(RouterError::NotAuthorized {
                        kind: "request-missing-chunks",
                        sender,
                    }
                    .into());
                }
                let resends = self.announcer.build_resends(&self.store, &missing_chunks)?;
                self.announcer.send_resends(channel, resends).await?;
            }
            AppMessage::CellReveal { row, col } => {
                self.apply_cell(GridPos::new(row, col), true);
            }
            AppMessage::CellFlag { row, col } => {
                self.apply_cell(GridPos::new(row, col), false);
            }
            AppMessage::CursorHint { row, col } => {
                self.control.on_cursor_hint(&sender, GridPos::new(row, col));
            }
            AppMessage::NewGame { difficulty } => self.control.on_new_game(difficulty),
            AppMessage::TimerSync { elapsed_seconds } => {
                self.control.on_timer_sync(elapsed_seconds)
            }
            AppMessage::GameOver { won } => self.control.on_game_over(won),
            AppMessage::Reset => self.control.on_reset(),
            AppMessage::DifficultyChange { difficulty } => {
                self.control.on_difficulty_change(difficulty)
            }
        }
        Ok(())
    }

    /// Gameplay cell updates are tolerant: a stale or out-of-bounds
    /// position is logged and dropped rather than tearing the session
    /// down, and re-delivery of an already-applied update is a no-op.
    fn apply_cell(&mut self, pos: GridPos, reveal: bool) {
        let applied = if reveal {
            self.store.reveal(pos)
        } else {
            self.store.toggle_flag(pos)
        };
        match applied {
            Ok(changed) => {
                if !changed {
                    debug!(row = pos.row, col = pos.col, "cell update was a no-op");
                }
            }
            Err(err) => warn!(row = pos.row, col = pos.col, %err, "dropping cell update"),
        }
    }

    fn try_finish_sync(&mut self) -> Result<()> {
        if let Some(snapshot) = self.sync.try_assemble()? {
            self.store.apply_snapshot(snapshot)?;
            self.notifier.notify(Notice::SyncComplete);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardConfig, MemoryBoard};
    use crate::channel::testing::RecordingChannel;
    use crate::config::SessionConfig;
    use crate::monitor::TracingNotifier;

    #[derive(Default)]
    struct RecordingControl {
        new_games: Vec<Difficulty>,
        timer: Option<u64>,
        game_overs: Vec<bool>,
        resets: u32,
        cursor: Option<(PeerIdentity, GridPos)>,
        configurations: u32,
    }

    impl ControlEvents for RecordingControl {
        fn on_state_configuration(&mut self, _config: &ScalarConfig) {
            self.configurations += 1;
        }
        fn on_new_game(&mut self, difficulty: Difficulty) {
            self.new_games.push(difficulty);
        }
        fn on_timer_sync(&mut self, elapsed_seconds: u64) {
            self.timer = Some(elapsed_seconds);
        }
        fn on_game_over(&mut self, won: bool) {
            self.game_overs.push(won);
        }
        fn on_reset(&mut self) {
            self.resets += 1;
        }
        fn on_difficulty_change(&mut self, _difficulty: Difficulty) {}
        fn on_cursor_hint(&mut self, sender: &PeerIdentity, pos: GridPos) {
            self.cursor = Some((sender.clone(), pos));
        }
    }

    fn board() -> MemoryBoard {
        let mut board =
            MemoryBoard::new(BoardConfig::from_difficulty(Difficulty::Beginner).unwrap());
        board
            .place_mines(&[GridPos::new(0, 0), GridPos::new(8, 8)])
            .unwrap();
        board
    }

    fn router(role: PeerRole) -> MessageRouter<MemoryBoard, RecordingControl> {
        MessageRouter::new(
            PeerIdentity::from_string("local"),
            role,
            board(),
            RecordingControl::default(),
            SessionConfig::testing().sync,
            Arc::new(TracingNotifier),
        )
    }

    fn from_remote(message: AppMessage) -> Envelope {
        Envelope::new(PeerIdentity::from_string("remote"), message)
    }

    #[tokio::test]
    async fn test_reveal_applies_once() {
        let mut router = router(PeerRole::Follower);
        let channel = RecordingChannel::new();

        let reveal = from_remote(AppMessage::CellReveal { row: 4, col: 4 });
        router.route(&channel, reveal.clone()).await.unwrap();
        router.route(&channel, reveal).await.unwrap();

        assert_eq!(router.store().revealed_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_bounds_reveal_is_dropped() {
        let mut router = router(PeerRole::Follower);
        let channel = RecordingChannel::new();

        let reveal = from_remote(AppMessage::CellReveal { row: 200, col: 4 });
        router.route(&channel, reveal).await.unwrap();
        assert_eq!(router.store().revealed_count(), 0);
    }

    #[tokio::test]
    async fn test_host_rejects_state_bearing_messages() {
        let mut router = router(PeerRole::Host);
        let channel = RecordingChannel::new();

        let timer = from_remote(AppMessage::TimerSync { elapsed_seconds: 9 });
        let err = router.route(&channel, timer).await.unwrap_err();
        assert!(err.to_string().contains("host authority"));
        assert!(router.control().timer.is_none());
    }

    #[tokio::test]
    async fn test_follower_cannot_serve_missing_chunks() {
        let mut router = router(PeerRole::Follower);
        let channel = RecordingChannel::new();

        let request = from_remote(AppMessage::RequestMissingChunks {
            missing_chunks: vec![0],
        });
        assert!(router.route(&channel, request).await.is_err());
        assert!(channel.sent_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_serves_missing_chunks() {
        let mut router = router(PeerRole::Host);
        let channel = RecordingChannel::new();

        let request = from_remote(AppMessage::RequestMissingChunks {
            missing_chunks: vec![0, 1],
        });
        router.route(&channel, request).await.unwrap();

        let sent = channel.sent_messages();
        assert_eq!(sent.len(), 2);
        for envelope in sent {
            match envelope.message {
                AppMessage::BoardChunk(chunk) => assert!(chunk.resend),
                other => panic!("unexpected message {}", other.kind()),
            }
        }
    }

    #[tokio::test]
    async fn test_control_messages_reach_handler() {
        let mut router = router(PeerRole::Follower);
        let channel = RecordingChannel::new();

        router
            .route(&channel, from_remote(AppMessage::TimerSync { elapsed_seconds: 42 }))
            .await
            .unwrap();
        router
            .route(&channel, from_remote(AppMessage::GameOver { won: false }))
            .await
            .unwrap();
        router
            .route(&channel, from_remote(AppMessage::CursorHint { row: 1, col: 2 }))
            .await
            .unwrap();

        assert_eq!(router.control().timer, Some(42));
        assert_eq!(router.control().game_overs, vec![false]);
        assert_eq!(
            router.control().cursor,
            Some((PeerIdentity::from_string("remote"), GridPos::new(1, 2)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sync_lands_in_store() {
        let host = router(PeerRole::Host);
        let mut follower = router(PeerRole::Follower);
        let host_to_follower = RecordingChannel::new();
        let unused = RecordingChannel::new();

        host.announce_state(&host_to_follower).await.unwrap();
        for envelope in host_to_follower.sent_messages() {
            follower.route(&unused, envelope).await.unwrap();
        }

        assert_eq!(
            follower.store().mine_locations(),
            host.store().mine_locations()
        );
        assert_eq!(follower.control().configurations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sync_requests_missing_chunks() {
        let mut follower = router(PeerRole::Follower);
        let channel = RecordingChannel::new();
        let sync_config = SessionConfig::testing().sync;

        let config = board().scalar_config();
        follower
            .route(
                &channel,
                from_remote(AppMessage::StateConfiguration(config)),
            )
            .await
            .unwrap();

        tokio::time::advance(sync_config.missing_chunk_timeout * 2).await;
        follower.poll_sync(&channel).await.unwrap();

        let sent = channel.sent_messages();
        assert_eq!(sent.len(), 1);
        match &sent[0].message {
            AppMessage::RequestMissingChunks { missing_chunks } => {
                assert!(!missing_chunks.is_empty())
            }
            other => panic!("unexpected message {}", other.kind()),
        }
    }
}
