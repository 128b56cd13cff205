//! Full-board state synchronization
//!
//! The host announces its board as a scalar configuration, a sequence
//! of bounded cell chunks, and a final mine-locations message. The
//! follower accumulates out-of-order chunks, asks for anything missing,
//! and only swaps its board once the full set has arrived and
//! reassembled cleanly.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::board::{BoardSnapshot, ChunkCell, GameStateStore, ScalarConfig};
use crate::channel::DataChannel;
use crate::config::SyncConfig;
use crate::errors::{Result, SyncError};
use crate::message::{AppMessage, BoardChunk, Envelope};
use crate::types::{GridPos, PeerIdentity};

// ----------------------------------------------------------------------------
// Chunking
// ----------------------------------------------------------------------------

/// Split the full cell list into fixed-size chunks, row-major. Every
/// cell lands in exactly one chunk.
pub fn chunk_cells(cells: Vec<ChunkCell>, chunk_size: usize) -> Vec<BoardChunk> {
    let total = cells.len().div_ceil(chunk_size) as u32;
    cells
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| BoardChunk {
            chunk_index: index as u32,
            total_chunks: total,
            cells: slice.to_vec(),
            resend: false,
        })
        .collect()
}

fn expected_chunks(config: &ScalarConfig, chunk_size: usize) -> u32 {
    config.cell_count().div_ceil(chunk_size) as u32
}

// ----------------------------------------------------------------------------
// Host Side
// ----------------------------------------------------------------------------

/// Complete transfer for one board, in send order.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub config: ScalarConfig,
    pub chunks: Vec<BoardChunk>,
    pub mine_locations: Vec<GridPos>,
}

/// Host-side sender for full-state transfers.
pub struct StateAnnouncer {
    sender: PeerIdentity,
    config: SyncConfig,
}

impl StateAnnouncer {
    pub fn new(sender: PeerIdentity, config: SyncConfig) -> Self {
        Self { sender, config }
    }

    /// Snapshot the store into a complete transfer.
    pub fn build(&self, store: &dyn GameStateStore) -> Announcement {
        let scalar = store.scalar_config();
        let cells = store.cell_range(0..scalar.cell_count());
        Announcement {
            chunks: chunk_cells(cells, self.config.chunk_size),
            mine_locations: store.mine_locations(),
            config: scalar,
        }
    }

    /// Send a full transfer: configuration first, then every chunk,
    /// then the mine locations. Waits out the settle delay so the
    /// just-opened channel is ready on the far side. Undelivered
    /// messages are logged and left to the repair path.
    pub async fn announce(
        &self,
        channel: &dyn DataChannel,
        store: &dyn GameStateStore,
    ) -> Result<()> {
        let announcement = self.build(store);
        tokio::time::sleep(self.config.settle_delay).await;
        info!(
            chunks = announcement.chunks.len(),
            mines = announcement.mine_locations.len(),
            "announcing board state"
        );

        self.send(channel, AppMessage::StateConfiguration(announcement.config))
            .await?;
        for chunk in announcement.chunks {
            self.send(channel, AppMessage::BoardChunk(chunk)).await?;
        }
        self.send(
            channel,
            AppMessage::MineLocations {
                mine_locations: announcement.mine_locations,
            },
        )
        .await
    }

    /// Rebuild the requested chunks from current store state, marked as
    /// resends.
    pub fn build_resends(
        &self,
        store: &dyn GameStateStore,
        missing: &[u32],
    ) -> Result<Vec<BoardChunk>> {
        let scalar = store.scalar_config();
        let total = expected_chunks(&scalar, self.config.chunk_size);
        let mut resends = Vec::with_capacity(missing.len());
        for &index in missing {
            if index >= total {
                return Err(SyncError::ChunkOutOfRange { index, total }.into());
            }
            let start = index as usize * self.config.chunk_size;
            let end = (start + self.config.chunk_size).min(scalar.cell_count());
            resends.push(BoardChunk {
                chunk_index: index,
                total_chunks: total,
                cells: store.cell_range(start..end),
                resend: true,
            });
        }
        Ok(resends)
    }

    /// Send resends with a short stagger between chunks so a lossy
    /// channel is not hit with a burst.
    pub async fn send_resends(
        &self,
        channel: &dyn DataChannel,
        resends: Vec<BoardChunk>,
    ) -> Result<()> {
        let mut first = true;
        for chunk in resends {
            if !first {
                tokio::time::sleep(self.config.resend_stagger).await;
            }
            first = false;
            debug!(index = chunk.chunk_index, "resending chunk");
            self.send(channel, AppMessage::BoardChunk(chunk)).await?;
        }
        Ok(())
    }

    async fn send(&self, channel: &dyn DataChannel, message: AppMessage) -> Result<()> {
        let envelope = Envelope::new(self.sender.clone(), message);
        if !channel.send(&envelope).await? {
            warn!(kind = envelope.message.kind(), "message not delivered");
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Follower Side
// ----------------------------------------------------------------------------

/// Accumulator for one in-flight transfer.
#[derive(Debug)]
pub struct PendingSync {
    config: ScalarConfig,
    expected_chunks: u32,
    received: HashMap<u32, Vec<ChunkCell>>,
    mines: Option<Vec<GridPos>>,
    last_activity: tokio::time::Instant,
}

impl PendingSync {
    fn new(config: ScalarConfig, chunk_size: usize) -> Self {
        Self {
            expected_chunks: expected_chunks(&config, chunk_size),
            config,
            received: HashMap::new(),
            mines: None,
            last_activity: tokio::time::Instant::now(),
        }
    }

    pub fn expected_chunks(&self) -> u32 {
        self.expected_chunks
    }

    pub fn is_complete(&self) -> bool {
        self.mines.is_some() && self.received.len() as u32 == self.expected_chunks
    }

    /// Chunk indices not yet received, ascending.
    pub fn missing_indices(&self) -> Vec<u32> {
        (0..self.expected_chunks)
            .filter(|index| !self.received.contains_key(index))
            .collect()
    }

    fn touch(&mut self) {
        self.last_activity = tokio::time::Instant::now();
    }
}

/// Follower-side state transfer protocol. A new configuration starts a
/// fresh accumulator; chunks and mine locations fill it; assembly is
/// all-or-nothing.
pub struct StateSync {
    config: SyncConfig,
    pending: Option<PendingSync>,
}

impl StateSync {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingSync> {
        self.pending.as_ref()
    }

    /// New transfer announced. Any earlier partial transfer is
    /// discarded; the host's latest state wins.
    pub fn on_configuration(&mut self, scalar: ScalarConfig) {
        if self.pending.is_some() {
            debug!("new configuration received, discarding partial transfer");
        }
        self.pending = Some(PendingSync::new(scalar, self.config.chunk_size));
    }

    pub fn on_chunk(&mut self, chunk: BoardChunk) -> Result<()> {
        let pending = self.pending.as_mut().ok_or(SyncError::NoPendingSync)?;
        if chunk.total_chunks != pending.expected_chunks {
            return Err(SyncError::ChunkCountMismatch {
                expected: pending.expected_chunks,
                actual: chunk.total_chunks,
            }
            .into());
        }
        if chunk.chunk_index >= pending.expected_chunks {
            return Err(SyncError::ChunkOutOfRange {
                index: chunk.chunk_index,
                total: pending.expected_chunks,
            }
            .into());
        }
        // Duplicates replace; re-application of the same state is safe.
        pending.received.insert(chunk.chunk_index, chunk.cells);
        pending.touch();
        Ok(())
    }

    pub fn on_mine_locations(&mut self, mines: Vec<GridPos>) -> Result<()> {
        let pending = self.pending.as_mut().ok_or(SyncError::NoPendingSync)?;
        pending.mines = Some(mines);
        pending.touch();
        Ok(())
    }

    /// Assemble the snapshot if the transfer is complete. Consumes the
    /// accumulator on success; an incomplete transfer returns `None`
    /// and keeps accumulating.
    pub fn try_assemble(&mut self) -> Result<Option<BoardSnapshot>> {
        let complete = self.pending.as_ref().is_some_and(PendingSync::is_complete);
        if !complete {
            return Ok(None);
        }
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(None),
        };

        let mut cells = Vec::with_capacity(pending.config.cell_count());
        let mut received = pending.received;
        for index in 0..pending.expected_chunks {
            match received.remove(&index) {
                Some(chunk) => cells.extend(chunk),
                None => {
                    return Err(SyncError::Assembly {
                        reason: format!("chunk {index} vanished during assembly"),
                    }
                    .into());
                }
            }
        }
        let mines = pending.mines.unwrap_or_default();
        let snapshot =
            BoardSnapshot::assemble(pending.config.board_config(), &mines, &cells)?;
        info!(
            revealed = snapshot.revealed_count,
            "board state assembled"
        );
        Ok(Some(snapshot))
    }

    /// If a transfer has stalled past the idle timeout, return the
    /// missing chunk indices to request and restart the idle clock.
    pub fn check_stale(&mut self) -> Option<Vec<u32>> {
        let pending = self.pending.as_mut()?;
        if pending.is_complete()
            || pending.last_activity.elapsed() < self.config.missing_chunk_timeout
        {
            return None;
        }
        pending.touch();
        let missing = pending.missing_indices();
        warn!(missing = missing.len(), "transfer stalled, requesting missing chunks");
        Some(missing)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardConfig, Difficulty, MemoryBoard};
    use crate::channel::testing::RecordingChannel;
    use crate::config::SessionConfig;

    fn host_board() -> MemoryBoard {
        let mut board =
            MemoryBoard::new(BoardConfig::from_difficulty(Difficulty::Beginner).unwrap());
        board
            .place_mines(&[
                GridPos::new(0, 0),
                GridPos::new(1, 1),
                GridPos::new(2, 2),
                GridPos::new(4, 4),
                GridPos::new(5, 7),
                GridPos::new(6, 0),
                GridPos::new(7, 3),
                GridPos::new(8, 8),
                GridPos::new(3, 5),
                GridPos::new(0, 8),
            ])
            .unwrap();
        for pos in [
            GridPos::new(0, 4),
            GridPos::new(3, 3),
            GridPos::new(5, 5),
            GridPos::new(8, 0),
            GridPos::new(7, 7),
        ] {
            board.reveal(pos).unwrap();
        }
        board.toggle_flag(GridPos::new(1, 1)).unwrap();
        board
    }

    fn testing_sync() -> SyncConfig {
        SessionConfig::testing().sync
    }

    fn announcer() -> StateAnnouncer {
        StateAnnouncer::new(PeerIdentity::from_string("host"), testing_sync())
    }

    fn feed(sync: &mut StateSync, announcement: &Announcement, skip: &[u32]) {
        sync.on_configuration(announcement.config.clone());
        for chunk in &announcement.chunks {
            if !skip.contains(&chunk.chunk_index) {
                sync.on_chunk(chunk.clone()).unwrap();
            }
        }
        sync.on_mine_locations(announcement.mine_locations.clone())
            .unwrap();
    }

    #[test]
    fn test_chunking_covers_every_cell_once() {
        let cells: Vec<ChunkCell> = (0..81u16)
            .map(|n| ChunkCell {
                row: n / 9,
                col: n % 9,
                is_revealed: false,
                is_flagged: false,
            })
            .collect();
        let chunks = chunk_cells(cells.clone(), 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].cells.len(), 50);
        assert_eq!(chunks[1].cells.len(), 31);
        assert!(chunks.iter().all(|c| c.total_chunks == 2 && !c.resend));

        let flattened: Vec<ChunkCell> =
            chunks.into_iter().flat_map(|c| c.cells).collect();
        assert_eq!(flattened, cells);
    }

    #[test]
    fn test_full_transfer_reproduces_host_state() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());

        feed(&mut sync, &announcement, &[]);
        let snapshot = sync.try_assemble().unwrap().unwrap();
        assert_eq!(snapshot.revealed_count, 5);
        assert_eq!(snapshot.remaining_mines, 9);

        let mut follower = MemoryBoard::new(announcement.config.board_config());
        follower.apply_snapshot(snapshot).unwrap();
        let config = board.config();
        for row in 0..config.rows {
            for col in 0..config.cols {
                let pos = GridPos::new(row, col);
                assert_eq!(
                    follower.cell(pos).unwrap(),
                    board.cell(pos).unwrap(),
                    "cell mismatch at {row},{col}"
                );
            }
        }
        assert_eq!(follower.revealed_count(), board.revealed_count());
        assert_eq!(follower.remaining_mines(), board.remaining_mines());
    }

    #[test]
    fn test_mines_before_final_chunk_still_assembles() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());

        sync.on_configuration(announcement.config.clone());
        sync.on_mine_locations(announcement.mine_locations.clone())
            .unwrap();
        let (last, rest) = announcement.chunks.split_last().unwrap();
        for chunk in rest {
            sync.on_chunk(chunk.clone()).unwrap();
        }
        assert!(sync.try_assemble().unwrap().is_none());

        // The set completes on the final chunk even though the mine
        // list arrived first.
        sync.on_chunk(last.clone()).unwrap();
        let snapshot = sync.try_assemble().unwrap().unwrap();
        assert_eq!(snapshot.revealed_count, 5);
        assert_eq!(snapshot.remaining_mines, 9);
    }

    #[test]
    fn test_missing_chunk_blocks_assembly_until_resent() {
        let board = host_board();
        let announcer = announcer();
        let announcement = announcer.build(&board);
        let mut sync = StateSync::new(testing_sync());

        feed(&mut sync, &announcement, &[1]);
        assert!(sync.try_assemble().unwrap().is_none());
        assert_eq!(sync.pending().unwrap().missing_indices(), vec![1]);

        let resends = announcer.build_resends(&board, &[1]).unwrap();
        assert!(resends[0].resend);
        sync.on_chunk(resends[0].clone()).unwrap();

        let snapshot = sync.try_assemble().unwrap().unwrap();
        assert_eq!(snapshot.revealed_count, 5);
    }

    #[test]
    fn test_duplicate_chunks_are_harmless() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());

        feed(&mut sync, &announcement, &[]);
        sync.on_chunk(announcement.chunks[0].clone()).unwrap();
        let snapshot = sync.try_assemble().unwrap().unwrap();
        assert_eq!(snapshot.revealed_count, 5);
    }

    #[test]
    fn test_chunk_without_configuration_rejected() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());
        assert!(sync.on_chunk(announcement.chunks[0].clone()).is_err());
    }

    #[test]
    fn test_chunk_shape_validation() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());
        sync.on_configuration(announcement.config.clone());

        let mut out_of_range = announcement.chunks[0].clone();
        out_of_range.chunk_index = 99;
        assert!(sync.on_chunk(out_of_range).is_err());

        let mut wrong_total = announcement.chunks[0].clone();
        wrong_total.total_chunks = 7;
        assert!(sync.on_chunk(wrong_total).is_err());
    }

    #[test]
    fn test_new_configuration_discards_partial_transfer() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());

        sync.on_configuration(announcement.config.clone());
        sync.on_chunk(announcement.chunks[0].clone()).unwrap();

        sync.on_configuration(announcement.config.clone());
        let expected = sync.pending().unwrap().expected_chunks();
        assert_eq!(
            sync.pending().unwrap().missing_indices(),
            (0..expected).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_resend_request_validation() {
        let board = host_board();
        assert!(announcer().build_resends(&board, &[0, 99]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_order_and_settle_delay() {
        let board = host_board();
        let channel = RecordingChannel::new();
        announcer().announce(&channel, &board).await.unwrap();

        let sent = channel.sent_messages();
        assert!(matches!(
            sent.first().map(|e| &e.message),
            Some(AppMessage::StateConfiguration(_))
        ));
        assert!(matches!(
            sent.last().map(|e| &e.message),
            Some(AppMessage::MineLocations { .. })
        ));
        let chunk_count = sent
            .iter()
            .filter(|e| matches!(e.message, AppMessage::BoardChunk(_)))
            .count();
        assert_eq!(chunk_count as u32, sync_chunks_for(&board));
    }

    fn sync_chunks_for(board: &MemoryBoard) -> u32 {
        expected_chunks(&board.scalar_config(), testing_sync().chunk_size)
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn chunking_partitions_without_loss(
                len in 1usize..400,
                chunk_size in 1usize..80,
            ) {
                let cells: Vec<ChunkCell> = (0..len as u16)
                    .map(|n| ChunkCell {
                        row: n / 20,
                        col: n % 20,
                        is_revealed: n % 3 == 0,
                        is_flagged: n % 7 == 0 && n % 3 != 0,
                    })
                    .collect();

                let chunks = chunk_cells(cells.clone(), chunk_size);
                prop_assert_eq!(chunks.len(), len.div_ceil(chunk_size));
                for (i, chunk) in chunks.iter().enumerate() {
                    prop_assert_eq!(chunk.chunk_index as usize, i);
                    prop_assert_eq!(chunk.total_chunks as usize, chunks.len());
                    prop_assert!(chunk.cells.len() <= chunk_size);
                }

                let flattened: Vec<ChunkCell> =
                    chunks.into_iter().flat_map(|c| c.cells).collect();
                prop_assert_eq!(flattened, cells);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_transfer_requests_missing() {
        let board = host_board();
        let announcement = announcer().build(&board);
        let mut sync = StateSync::new(testing_sync());

        sync.on_configuration(announcement.config.clone());
        sync.on_chunk(announcement.chunks[0].clone()).unwrap();
        assert!(sync.check_stale().is_none());

        tokio::time::advance(testing_sync().missing_chunk_timeout * 2).await;
        let missing = sync.check_stale().unwrap();
        assert!(missing.contains(&1));

        // Clock restarted, no immediate re-request.
        assert!(sync.check_stale().is_none());
    }
}
