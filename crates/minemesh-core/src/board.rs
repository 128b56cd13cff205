//! Board state and the `GameStateStore` collaborator interface
//!
//! The session layer never owns gameplay rules; it reads and writes board
//! state through [`GameStateStore`]. `MemoryBoard` is the reference
//! implementation used by the sync protocol and the test harness.
//!
//! Two invariants are enforced here rather than by callers:
//! `is_revealed` transitions only `false -> true` during a game, and
//! `is_flagged` toggles only while the cell is unrevealed.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::BoardError;
use crate::types::GridPos;

// ----------------------------------------------------------------------------
// Difficulty
// ----------------------------------------------------------------------------

/// Canonical board presets plus free-form custom boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Expert,
    Custom,
}

impl Difficulty {
    /// Preset (rows, cols, mines); `None` for custom boards.
    pub fn preset(&self) -> Option<(u16, u16, u32)> {
        match self {
            Difficulty::Beginner => Some((9, 9, 10)),
            Difficulty::Intermediate => Some((16, 16, 40)),
            Difficulty::Expert => Some((16, 30, 99)),
            Difficulty::Custom => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Cell State
// ----------------------------------------------------------------------------

/// Full per-cell state as known to the authoritative board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellState {
    pub is_mine: bool,
    pub is_revealed: bool,
    pub is_flagged: bool,
    pub adjacent_mines: u8,
}

/// The per-cell slice carried by a board chunk: position plus the two
/// bits a follower may not derive locally. Mine identity is withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkCell {
    pub row: u16,
    pub col: u16,
    pub is_revealed: bool,
    pub is_flagged: bool,
}

impl ChunkCell {
    pub fn pos(&self) -> GridPos {
        GridPos::new(self.row, self.col)
    }
}

// ----------------------------------------------------------------------------
// Board Configuration
// ----------------------------------------------------------------------------

/// Grid dimensions and mine budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub rows: u16,
    pub cols: u16,
    pub mine_count: u32,
    pub difficulty: Difficulty,
}

impl BoardConfig {
    pub fn new(rows: u16, cols: u16, mine_count: u32, difficulty: Difficulty) -> Self {
        Self {
            rows,
            cols,
            mine_count,
            difficulty,
        }
    }

    pub fn from_difficulty(difficulty: Difficulty) -> Option<Self> {
        difficulty
            .preset()
            .map(|(rows, cols, mines)| Self::new(rows, cols, mines, difficulty))
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }
}

/// Scalar board state broadcast in a `state-configuration` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarConfig {
    pub rows: u16,
    pub cols: u16,
    pub mine_count: u32,
    pub remaining_mines: i32,
    pub elapsed_seconds: u64,
    pub started: bool,
    pub over: bool,
    pub difficulty: Difficulty,
}

impl ScalarConfig {
    pub fn board_config(&self) -> BoardConfig {
        BoardConfig::new(self.rows, self.cols, self.mine_count, self.difficulty)
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

// ----------------------------------------------------------------------------
// Board Snapshot
// ----------------------------------------------------------------------------

/// A complete, internally consistent board image. Built atomically so a
/// partially transferred state can never reach the visible board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub config: BoardConfig,
    pub cells: Vec<CellState>,
    pub mine_locations: Vec<GridPos>,
    pub revealed_count: u32,
    pub remaining_mines: i32,
}

impl BoardSnapshot {
    /// Assemble a snapshot from the authoritative mine list and the
    /// revealed/flagged bits received in chunks. Adjacency counts are
    /// recomputed locally; they are never transmitted.
    pub fn assemble<'a, I>(
        config: BoardConfig,
        mines: &[GridPos],
        chunk_cells: I,
    ) -> Result<Self, BoardError>
    where
        I: IntoIterator<Item = &'a ChunkCell>,
    {
        let mut cells = vec![CellState::default(); config.cell_count()];

        for pos in mines {
            if !config.contains(*pos) {
                return Err(BoardError::OutOfBounds {
                    row: pos.row,
                    col: pos.col,
                    rows: config.rows,
                    cols: config.cols,
                });
            }
            cells[pos.index(config.cols)].is_mine = true;
        }
        compute_adjacency(&config, &mut cells);

        let mut flagged = 0i32;
        let mut revealed = 0u32;
        for cell in chunk_cells {
            let pos = cell.pos();
            if !config.contains(pos) {
                return Err(BoardError::OutOfBounds {
                    row: pos.row,
                    col: pos.col,
                    rows: config.rows,
                    cols: config.cols,
                });
            }
            let target = &mut cells[pos.index(config.cols)];
            target.is_revealed = cell.is_revealed;
            // A revealed cell cannot carry a flag.
            target.is_flagged = cell.is_flagged && !cell.is_revealed;
            if target.is_flagged {
                flagged += 1;
            }
            if target.is_revealed && !target.is_mine {
                revealed += 1;
            }
        }

        Ok(Self {
            config,
            cells,
            mine_locations: mines.to_vec(),
            revealed_count: revealed,
            remaining_mines: config.mine_count as i32 - flagged,
        })
    }
}

/// Increment neighbor counts around every mine.
fn compute_adjacency(config: &BoardConfig, cells: &mut [CellState]) {
    for row in 0..config.rows {
        for col in 0..config.cols {
            let idx = GridPos::new(row, col).index(config.cols);
            if !cells[idx].is_mine {
                continue;
            }
            for dr in -1i32..=1 {
                for dc in -1i32..=1 {
                    if dr == 0 && dc == 0 {
                        continue;
                    }
                    let (nr, nc) = (row as i32 + dr, col as i32 + dc);
                    if nr < 0 || nc < 0 || nr >= config.rows as i32 || nc >= config.cols as i32 {
                        continue;
                    }
                    let nidx = GridPos::new(nr as u16, nc as u16).index(config.cols);
                    cells[nidx].adjacent_mines += 1;
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Game State Store
// ----------------------------------------------------------------------------

/// Canonical board interface consumed by the sync protocol and router.
pub trait GameStateStore: Send {
    /// Scalar fields for the configuration message.
    fn scalar_config(&self) -> ScalarConfig;

    /// Row-major slice of cells as chunk payload entries.
    fn cell_range(&self, range: Range<usize>) -> Vec<ChunkCell>;

    /// Authoritative mine coordinate list.
    fn mine_locations(&self) -> Vec<GridPos>;

    /// Replace the entire board atomically.
    fn apply_snapshot(&mut self, snapshot: BoardSnapshot) -> Result<(), BoardError>;

    /// Reveal a cell. Returns `true` if the cell changed state.
    fn reveal(&mut self, pos: GridPos) -> Result<bool, BoardError>;

    /// Toggle a flag on an unrevealed cell. Returns `true` if it changed.
    fn toggle_flag(&mut self, pos: GridPos) -> Result<bool, BoardError>;
}

// ----------------------------------------------------------------------------
// In-Memory Board
// ----------------------------------------------------------------------------

/// Reference `GameStateStore` backed by a flat cell vector.
#[derive(Debug, Clone)]
pub struct MemoryBoard {
    config: BoardConfig,
    cells: Vec<CellState>,
    mine_locations: Vec<GridPos>,
    revealed_count: u32,
    flagged_count: i32,
    pub elapsed_seconds: u64,
    pub started: bool,
    pub over: bool,
}

impl MemoryBoard {
    /// Create an empty hidden board with no mines placed yet.
    pub fn new(config: BoardConfig) -> Self {
        Self {
            cells: vec![CellState::default(); config.cell_count()],
            config,
            mine_locations: Vec::new(),
            revealed_count: 0,
            flagged_count: 0,
            elapsed_seconds: 0,
            started: false,
            over: false,
        }
    }

    pub fn config(&self) -> BoardConfig {
        self.config
    }

    pub fn cell(&self, pos: GridPos) -> Result<&CellState, BoardError> {
        self.check_bounds(pos)?;
        Ok(&self.cells[pos.index(self.config.cols)])
    }

    pub fn revealed_count(&self) -> u32 {
        self.revealed_count
    }

    pub fn remaining_mines(&self) -> i32 {
        self.config.mine_count as i32 - self.flagged_count
    }

    /// Place mines from an explicit coordinate list and recompute
    /// adjacency. Replaces any previous placement.
    pub fn place_mines(&mut self, mines: &[GridPos]) -> Result<(), BoardError> {
        for pos in mines {
            self.check_bounds(*pos)?;
        }
        for cell in &mut self.cells {
            cell.is_mine = false;
            cell.adjacent_mines = 0;
        }
        for pos in mines {
            self.cells[pos.index(self.config.cols)].is_mine = true;
        }
        compute_adjacency(&self.config, &mut self.cells);
        self.mine_locations = mines.to_vec();
        Ok(())
    }

    fn check_bounds(&self, pos: GridPos) -> Result<(), BoardError> {
        if self.config.contains(pos) {
            Ok(())
        } else {
            Err(BoardError::OutOfBounds {
                row: pos.row,
                col: pos.col,
                rows: self.config.rows,
                cols: self.config.cols,
            })
        }
    }

    fn recount(&mut self) {
        self.revealed_count = self
            .cells
            .iter()
            .filter(|c| c.is_revealed && !c.is_mine)
            .count() as u32;
        self.flagged_count = self.cells.iter().filter(|c| c.is_flagged).count() as i32;
    }
}

impl GameStateStore for MemoryBoard {
    fn scalar_config(&self) -> ScalarConfig {
        ScalarConfig {
            rows: self.config.rows,
            cols: self.config.cols,
            mine_count: self.config.mine_count,
            remaining_mines: self.remaining_mines(),
            elapsed_seconds: self.elapsed_seconds,
            started: self.started,
            over: self.over,
            difficulty: self.config.difficulty,
        }
    }

    fn cell_range(&self, range: Range<usize>) -> Vec<ChunkCell> {
        let cols = self.config.cols;
        range
            .filter(|idx| *idx < self.cells.len())
            .map(|idx| {
                let cell = &self.cells[idx];
                ChunkCell {
                    row: (idx / cols as usize) as u16,
                    col: (idx % cols as usize) as u16,
                    is_revealed: cell.is_revealed,
                    is_flagged: cell.is_flagged,
                }
            })
            .collect()
    }

    fn mine_locations(&self) -> Vec<GridPos> {
        self.mine_locations.clone()
    }

    fn apply_snapshot(&mut self, snapshot: BoardSnapshot) -> Result<(), BoardError> {
        if snapshot.cells.len() != snapshot.config.cell_count() {
            return Err(BoardError::DimensionMismatch {
                rows: snapshot.config.rows,
                cols: snapshot.config.cols,
                cells: snapshot.cells.len(),
            });
        }
        self.config = snapshot.config;
        self.cells = snapshot.cells;
        self.mine_locations = snapshot.mine_locations;
        self.recount();
        Ok(())
    }

    fn reveal(&mut self, pos: GridPos) -> Result<bool, BoardError> {
        self.check_bounds(pos)?;
        let cell = &mut self.cells[pos.index(self.config.cols)];
        if cell.is_revealed || cell.is_flagged {
            return Ok(false);
        }
        cell.is_revealed = true;
        if !cell.is_mine {
            self.revealed_count += 1;
        }
        Ok(true)
    }

    fn toggle_flag(&mut self, pos: GridPos) -> Result<bool, BoardError> {
        self.check_bounds(pos)?;
        let cell = &mut self.cells[pos.index(self.config.cols)];
        if cell.is_revealed {
            return Ok(false);
        }
        cell.is_flagged = !cell.is_flagged;
        self.flagged_count += if cell.is_flagged { 1 } else { -1 };
        Ok(true)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
