//! The authoritative draw sequence.

use serde::{Serialize, Serializer};

use super::ticket::{BOARD_SIZE, MAX_NUMBER, MIN_NUMBER};

/// Unique, ordered sequence of drawn numbers within `[1, 90]`.
///
/// Membership is kept in a flat table so row checks stay O(1) per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawHistory {
    order: Vec<u8>,
    seen: [bool; BOARD_SIZE + 1],
}

impl Default for DrawHistory {
    fn default() -> Self {
        Self {
            order: Vec::with_capacity(BOARD_SIZE),
            seen: [false; BOARD_SIZE + 1],
        }
    }
}

impl DrawHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, dropping out-of-range values and repeats.
    pub fn from_numbers(numbers: &[u8]) -> Self {
        let mut history = Self::new();
        for &n in numbers {
            history.push(n);
        }
        history
    }

    /// Append a number. Returns `false` if it is out of range or already drawn.
    pub fn push(&mut self, number: u8) -> bool {
        if !(MIN_NUMBER..=MAX_NUMBER).contains(&number) || self.seen[number as usize] {
            return false;
        }
        self.seen[number as usize] = true;
        self.order.push(number);
        true
    }

    pub fn contains(&self, number: u8) -> bool {
        (number as usize) <= BOARD_SIZE && number != 0 && self.seen[number as usize]
    }

    pub fn last(&self) -> Option<u8> {
        self.order.last().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All 90 numbers are out.
    pub fn is_full(&self) -> bool {
        self.order.len() >= BOARD_SIZE
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.order
    }

    /// Numbers not drawn yet, ascending.
    pub fn remaining(&self) -> Vec<u8> {
        (MIN_NUMBER..=MAX_NUMBER)
            .filter(|&n| !self.seen[n as usize])
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Serialize for DrawHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.order.serialize(serializer)
    }
}
