//! Win history.
//!
//! Records are append-only across rounds and kept in a rolling window.
//! Durable mirroring is optional and sits behind [`HistoryStore`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::DEFAULT_HISTORY_CAP;

/// Verdict of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimOutcome {
    Bingo,
    FalseClaim,
}

/// One judged claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRecord {
    pub player_name: String,
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    pub outcome: ClaimOutcome,
    /// Names of everyone holding a ticket when the claim was judged
    pub participants_snapshot: Vec<String>,
    /// Rejected claims by this player since their last win
    pub failures_since_last_win: u32,
}

/// Rolling, capped list of records. Oldest entries fall off first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinHistory {
    records: VecDeque<WinRecord>,
    cap: usize,
    total: u64,
}

impl Default for WinHistory {
    fn default() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }
}

impl WinHistory {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(cap),
            cap: cap.max(1),
            total: 0,
        }
    }

    pub fn push(&mut self, record: WinRecord) {
        if self.records.len() == self.cap {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ever appended, including those rolled off.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = &WinRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&WinRecord> {
        self.records.back()
    }

    pub fn to_vec(&self) -> Vec<WinRecord> {
        self.records.iter().cloned().collect()
    }
}

/// Optional durable mirror of the win history.
pub trait HistoryStore: Send + Sync {
    fn append(&self, record: &WinRecord);

    /// Most recent records, oldest first.
    fn recent(&self, limit: usize) -> Vec<WinRecord>;
}

/// Memory-only store, shareable between a session and its observers.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    records: Arc<Mutex<Vec<WinRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, record: &WinRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }

    fn recent(&self, limit: usize) -> Vec<WinRecord> {
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }
}
