//! Client-side room mirror.
//!
//! A player device keeps a [`RoomMirror`] and feeds it every host message.
//! Each message overwrites the part of the mirror it covers, so applying a
//! message twice is harmless and a missed message is repaired by the next
//! one carrying the same field.

use std::collections::BTreeSet;

use super::history::WinRecord;
use super::player::PlayerId;
use super::protocol::{ClientMessage, EndReason, PlayerView, ServerMessage, SetView, WinnerView};
use super::room::RoomState;
use super::verifier::WinningRow;

/// Last verdict shown on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationView {
    pub player_id: PlayerId,
    pub success: bool,
    pub message: String,
    pub winning_rows: Vec<WinningRow>,
}

/// How the last round ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ending {
    pub winner: Option<WinnerView>,
    pub co_winners: Vec<WinnerView>,
    pub reason: EndReason,
}

/// Local copy of the host's room, as one player sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMirror {
    /// Whose device this is
    pub player_id: PlayerId,
    pub room_id: Option<String>,
    pub state: RoomState,
    pub round: u32,
    pub drawn_numbers: Vec<u8>,
    pub current_number: Option<u8>,
    pub draw_interval_seconds: u32,
    pub sets: Vec<SetView>,
    pub players: Vec<PlayerView>,
    pub win_history: Vec<WinRecord>,
    pub last_verification: Option<VerificationView>,
    pub last_ending: Option<Ending>,
    /// Most recent refusal of one of our own requests, as (code, message)
    pub last_rejection: Option<(String, String)>,
    marked: BTreeSet<u8>,
}

impl RoomMirror {
    pub fn new(player_id: impl Into<PlayerId>) -> Self {
        Self {
            player_id: player_id.into(),
            room_id: None,
            state: RoomState::Waiting,
            round: 0,
            drawn_numbers: Vec::new(),
            current_number: None,
            draw_interval_seconds: 0,
            sets: Vec::new(),
            players: Vec::new(),
            win_history: Vec::new(),
            last_verification: None,
            last_ending: None,
            last_rejection: None,
            marked: BTreeSet::new(),
        }
    }

    /// Has a snapshot arrived yet?
    pub fn is_synced(&self) -> bool {
        self.room_id.is_some()
    }

    /// Overwrite local state from a host message.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::Snapshot { snapshot } => {
                self.room_id = Some(snapshot.room_id.clone());
                self.state = snapshot.state;
                self.round = snapshot.round;
                self.drawn_numbers = snapshot.drawn_numbers.clone();
                self.current_number = snapshot.current_number;
                self.draw_interval_seconds = snapshot.draw_interval_seconds;
                self.sets = snapshot.sets.clone();
                self.players = snapshot.players.clone();
                self.win_history = snapshot.win_history.clone();
            }
            ServerMessage::GameRestarted { snapshot } => {
                self.apply(&ServerMessage::Snapshot {
                    snapshot: snapshot.clone(),
                });
                self.marked.clear();
                self.last_verification = None;
                self.last_ending = None;
            }
            ServerMessage::StateChanged { state } => {
                self.state = *state;
                if *state == RoomState::Playing {
                    self.last_verification = None;
                }
            }
            ServerMessage::NumbersDrawn { number, history } => {
                self.drawn_numbers = history.clone();
                self.current_number = Some(*number);
            }
            ServerMessage::SetsUpdated { sets } => self.sets = sets.clone(),
            ServerMessage::PlayersUpdated { players } => self.players = players.clone(),
            ServerMessage::SettingsUpdated {
                draw_interval_seconds,
            } => self.draw_interval_seconds = *draw_interval_seconds,
            ServerMessage::GameEnded {
                winner,
                co_winners,
                reason,
                win_record,
            } => {
                self.state = RoomState::Ended;
                self.last_ending = Some(Ending {
                    winner: winner.clone(),
                    co_winners: co_winners.clone(),
                    reason: *reason,
                });
                if let Some(record) = win_record {
                    if !self.win_history.contains(record) {
                        self.win_history.push(record.clone());
                    }
                }
            }
            ServerMessage::VerificationResult {
                player_id,
                success,
                message,
                winning_rows,
                ..
            } => {
                self.last_verification = Some(VerificationView {
                    player_id: player_id.clone(),
                    success: *success,
                    message: message.clone(),
                    winning_rows: winning_rows.clone(),
                });
            }
            ServerMessage::Rejected { code, message } => {
                self.last_rejection = Some((code.clone(), message.clone()));
            }
        }
    }

    pub fn me(&self) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == self.player_id)
    }

    /// Our ticket set, if we hold one.
    pub fn my_set(&self) -> Option<&SetView> {
        let set_id = self.me()?.ticket_set_id?;
        self.sets.iter().find(|s| s.id == set_id)
    }

    /// Joined mid-round and waiting for the next one.
    pub fn is_holding(&self) -> bool {
        self.me().is_some_and(|p| p.holding)
    }

    /// Flip a mark on our own ticket. Only numbers on the ticket can be marked.
    pub fn toggle_mark(&mut self, number: u8) -> bool {
        let on_ticket = self
            .my_set()
            .is_some_and(|set| set.data.iter().any(|grid| grid.contains(number)));
        if !on_ticket {
            return false;
        }
        if !self.marked.remove(&number) {
            self.marked.insert(number);
        }
        true
    }

    pub fn marked_numbers(&self) -> Vec<u8> {
        self.marked.iter().copied().collect()
    }

    /// A "Kinh!" claim carrying our marks for the audit trail.
    pub fn claim(&self) -> ClientMessage {
        ClientMessage::Claim {
            marked_numbers: self.marked_numbers(),
        }
    }
}
