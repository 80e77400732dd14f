//! Ticket grids and the catalog they come from.
//!
//! The catalog is an external collaborator: it hands over a fixed list of
//! ticket sets once, when a room is created. Grids are trusted as given.
//! Width and row count are catalog details; nothing here assumes 3 or 5 rows.

use serde::{Deserialize, Serialize};

/// Smallest number that can be drawn.
pub const MIN_NUMBER: u8 = 1;

/// Largest number that can be drawn.
pub const MAX_NUMBER: u8 = 90;

/// Number of distinct numbers in a full board.
pub const BOARD_SIZE: usize = MAX_NUMBER as usize;

/// A row-major matrix of numbers, with `0` marking a blank cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketGrid {
    /// Cells per row
    pub width: usize,

    /// Cells, row after row
    pub cells: Vec<u8>,
}

impl TicketGrid {
    pub fn new(width: usize, cells: Vec<u8>) -> Self {
        Self { width, cells }
    }

    /// Build a grid from explicit rows. Width is taken from the first row.
    pub fn from_rows(rows: &[&[u8]]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        let cells = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self { width, cells }
    }

    /// Iterate rows as slices.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.cells.chunks(self.width.max(1))
    }

    pub fn row_count(&self) -> usize {
        self.rows().count()
    }

    /// Nonzero numbers on the grid.
    pub fn numbers(&self) -> impl Iterator<Item = u8> + '_ {
        self.cells.iter().copied().filter(|&n| n != 0)
    }

    pub fn contains(&self, number: u8) -> bool {
        number != 0 && self.cells.contains(&number)
    }
}

/// A player's full bundle of grids.
pub type TicketSet = Vec<TicketGrid>;

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub grids: TicketSet,
}

impl CatalogEntry {
    pub fn new(id: u32, name: impl Into<String>, color: impl Into<String>, grids: TicketSet) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            grids,
        }
    }
}

/// Fixed, ordered list of ticket sets. Read once per room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketCatalog {
    entries: Vec<CatalogEntry>,
}

impl TicketCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Parse a catalog from its JSON array form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, id: u32) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
