//! Win verification.
//!
//! A claim is judged only against the authoritative draw history. Whatever
//! the claimant marked on their own screen is never part of the verdict.

use serde::{Deserialize, Serialize};

use super::draws::DrawHistory;
use super::ticket::TicketGrid;

/// Hit count for a single ticket row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowStatus {
    /// Nonzero cells already drawn
    pub hits: usize,
    /// Nonzero cells in the row
    pub total: usize,
}

impl RowStatus {
    /// Measure a row against the draw history.
    pub fn of(row: &[u8], drawn: &DrawHistory) -> Self {
        let mut hits = 0;
        let mut total = 0;
        for &n in row.iter().filter(|&&n| n != 0) {
            total += 1;
            if drawn.contains(n) {
                hits += 1;
            }
        }
        Self { hits, total }
    }

    /// Every nonzero cell is drawn (and there is at least one).
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.hits == self.total
    }

    /// One number away from completion.
    pub fn is_waiting(&self) -> bool {
        self.total > 0 && self.hits + 1 == self.total
    }
}

/// Location of a completed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningRow {
    pub grid_index: usize,
    pub row_index: usize,
    pub numbers: Vec<u8>,
}

/// True iff some ticket has a row whose nonzero cells are all drawn.
pub fn check_bingo(tickets: &[TicketGrid], drawn: &DrawHistory) -> bool {
    tickets
        .iter()
        .flat_map(|grid| grid.rows())
        .any(|row| RowStatus::of(row, drawn).is_complete())
}

/// Every completed row in the set, for highlighting on the result screen.
pub fn winning_rows(tickets: &[TicketGrid], drawn: &DrawHistory) -> Vec<WinningRow> {
    let mut rows = Vec::new();
    for (grid_index, grid) in tickets.iter().enumerate() {
        for (row_index, row) in grid.rows().enumerate() {
            if RowStatus::of(row, drawn).is_complete() {
                rows.push(WinningRow {
                    grid_index,
                    row_index,
                    numbers: row.iter().copied().filter(|&n| n != 0).collect(),
                });
            }
        }
    }
    rows
}

/// Would drawing `number` complete a row in this set?
pub fn completes_row(tickets: &[TicketGrid], drawn: &DrawHistory, number: u8) -> bool {
    if drawn.contains(number) {
        return false;
    }
    tickets
        .iter()
        .flat_map(|grid| grid.rows())
        .filter(|row| row.contains(&number))
        .any(|row| RowStatus::of(row, drawn).is_waiting())
}
