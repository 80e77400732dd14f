//! Room state.
//!
//! The room is the authoritative aggregate: players, ticket sets, draw
//! history and win history. Only the host's session mutates it. Every
//! validating method checks first and mutates after, so a rejected request
//! leaves the room untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::draws::DrawHistory;
use super::error::SessionError;
use super::history::{WinHistory, WinRecord};
use super::player::{Player, PlayerId, SeatEvent};
use super::regulator::SeatedTickets;
use super::ticket::{TicketCatalog, TicketSet};

/// Room state machine states.
///
/// ```text
/// WAITING ──start──▶ PLAYING ◀──pause/resume──▶ PAUSED
///    ▲                  │  │                       │
///    │                  │  └──────first bingo──────┤
///    │          full    │                          ▼
///    │          board   │                   BINGO_WINDOW
///    │                  ▼                          │
///    └───restart──── ENDED ◀────window closes──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    #[default]
    Waiting,
    Playing,
    Paused,
    BingoWindow,
    Ended,
}

impl RoomState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::BingoWindow => "BINGO_WINDOW",
            Self::Ended => "ENDED",
        }
    }

    /// A round is underway (numbers may still come or claims be judged).
    pub fn is_round_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::BingoWindow)
    }

    /// Claims are accepted.
    pub fn accepts_claims(&self) -> bool {
        self.is_round_active()
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ticket set as offered in this room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetSlot {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub grids: TicketSet,
    pub taken_by: Option<PlayerId>,
}

impl SetSlot {
    pub fn is_taken(&self) -> bool {
        self.taken_by.is_some()
    }
}

/// Whether a join created a player or re-attached an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Rejoined,
}

/// The authoritative room aggregate.
#[derive(Debug, Clone)]
pub struct Room {
    /// Unique room ID
    pub id: String,

    /// Who runs the session
    pub host_id: PlayerId,

    /// Current state
    pub state: RoomState,

    /// Numbers drawn this round
    drawn: DrawHistory,

    /// Most recent number
    pub current_number: Option<u8>,

    /// Catalog snapshot, with assignment
    sets: Vec<SetSlot>,

    /// Players in join order
    players: Vec<Player>,

    /// Judged claims, across rounds
    win_history: WinHistory,

    /// Seconds between draws, within [1, 60]
    pub draw_interval_seconds: u32,

    /// Round number, 0 before the first start
    pub round: u32,

    /// When the room was opened
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Open a room. The catalog is snapshotted here and never read again.
    pub fn new(
        id: impl Into<String>,
        host_id: impl Into<PlayerId>,
        catalog: &TicketCatalog,
        draw_interval_seconds: u32,
        history_cap: usize,
        created_at: DateTime<Utc>,
    ) -> Self {
        let sets = catalog
            .entries()
            .iter()
            .map(|entry| SetSlot {
                id: entry.id,
                name: entry.name.clone(),
                color: entry.color.clone(),
                grids: entry.grids.clone(),
                taken_by: None,
            })
            .collect();

        Self {
            id: id.into(),
            host_id: host_id.into(),
            state: RoomState::Waiting,
            drawn: DrawHistory::new(),
            current_number: None,
            sets,
            players: Vec::new(),
            win_history: WinHistory::with_cap(history_cap),
            draw_interval_seconds: super::config::clamp_interval(draw_interval_seconds),
            round: 0,
            created_at,
        }
    }

    // Players

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|p| p.ready).count()
    }

    /// At least one player, and all of them ready.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.ready)
    }

    fn require_player(&self, player_id: &str) -> Result<&Player, SessionError> {
        self.player(player_id)
            .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))
    }

    /// Create or re-attach a player.
    ///
    /// New players in WAITING get the first free set; anyone arriving while
    /// a round runs is held without a ticket until the room is back in WAITING.
    pub fn join(&mut self, player_id: &str, name: &str, now: DateTime<Utc>) -> JoinOutcome {
        if let Some(player) = self.player_mut(player_id) {
            if !name.is_empty() {
                player.name = name.to_string();
            }
            player.connected = true;
            return JoinOutcome::Rejoined;
        }

        if self.state == RoomState::Waiting {
            self.players.push(Player::new(player_id, name, now));
            self.assign_free_set(player_id);
        } else {
            self.players.push(Player::holding(player_id, name, now));
        }
        JoinOutcome::Joined
    }

    /// Remove a player entirely, freeing their set.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let player = self.players.remove(index);
        self.release_set_of(player_id);
        Some(player)
    }

    pub fn set_connected(&mut self, player_id: &str, connected: bool) -> Result<(), SessionError> {
        self.require_player(player_id)?;
        if let Some(player) = self.player_mut(player_id) {
            player.connected = connected;
        }
        Ok(())
    }

    /// Seated players with their grids, in join order.
    pub fn seated_tickets(&self) -> Vec<SeatedTickets<'_>> {
        self.players
            .iter()
            .filter(|p| p.has_ticket())
            .map(|p| SeatedTickets::new(&p.id, &p.tickets))
            .collect()
    }

    /// Names of everyone holding a ticket.
    pub fn participants(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| p.has_ticket())
            .map(|p| p.name.clone())
            .collect()
    }

    // Ticket sets

    pub fn sets(&self) -> &[SetSlot] {
        &self.sets
    }

    pub fn set(&self, set_id: u32) -> Option<&SetSlot> {
        self.sets.iter().find(|s| s.id == set_id)
    }

    /// Pick a set. Allowed between rounds only; swapping releases the old set.
    pub fn select_set(&mut self, player_id: &str, set_id: u32) -> Result<(), SessionError> {
        let player = self.require_player(player_id)?;
        if player.seat().is_holding() {
            return Err(SessionError::Holding);
        }
        if self.state != RoomState::Waiting {
            return Err(SessionError::SeatLocked);
        }
        let slot = self.set(set_id).ok_or(SessionError::UnknownSet(set_id))?;
        match slot.taken_by.as_deref() {
            Some(owner) if owner == player_id => return Ok(()),
            Some(_) => return Err(SessionError::SetTaken(set_id)),
            None => {}
        }

        self.take_set(player_id, set_id);
        Ok(())
    }

    /// Give the set back. Allowed between rounds only.
    pub fn leave_seat(&mut self, player_id: &str) -> Result<(), SessionError> {
        let player = self.require_player(player_id)?;
        if player.seat().is_holding() {
            return Err(SessionError::Holding);
        }
        if self.state != RoomState::Waiting {
            return Err(SessionError::SeatLocked);
        }
        if !player.seat().is_seated() {
            return Err(SessionError::NoTicket);
        }

        self.release_set_of(player_id);
        if let Some(player) = self.player_mut(player_id) {
            player
                .apply_seat(SeatEvent::LeaveSeat, Vec::new())
                .map_err(|_| SessionError::NoTicket)?;
        }
        Ok(())
    }

    /// Set a player's own ready flag. Readying needs a ticket.
    pub fn set_ready(&mut self, player_id: &str, ready: bool) -> Result<(), SessionError> {
        let player = self.require_player(player_id)?;
        if player.seat().is_holding() {
            return Err(SessionError::Holding);
        }
        if self.state != RoomState::Waiting {
            return Err(SessionError::invalid_state("change ready", self.state));
        }
        if ready && !player.has_ticket() {
            return Err(SessionError::NoTicket);
        }

        if let Some(player) = self.player_mut(player_id) {
            player.ready = ready;
        }
        Ok(())
    }

    fn assign_free_set(&mut self, player_id: &str) -> bool {
        let Some(set_id) = self.sets.iter().find(|s| !s.is_taken()).map(|s| s.id) else {
            debug!(room_id = %self.id, player_id, "no free ticket set to assign");
            return false;
        };
        self.take_set(player_id, set_id);
        true
    }

    fn take_set(&mut self, player_id: &str, set_id: u32) {
        let Some(grids) = self.set(set_id).map(|s| s.grids.clone()) else {
            return;
        };
        let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) else {
            return;
        };
        if player.apply_seat(SeatEvent::TakeSet { set_id }, grids).is_err() {
            return;
        }

        for slot in &mut self.sets {
            if slot.taken_by.as_deref() == Some(player_id) {
                slot.taken_by = None;
            }
            if slot.id == set_id {
                slot.taken_by = Some(player_id.to_string());
            }
        }
    }

    fn release_set_of(&mut self, player_id: &str) {
        for slot in &mut self.sets {
            if slot.taken_by.as_deref() == Some(player_id) {
                slot.taken_by = None;
            }
        }
    }

    // Draws

    pub fn drawn(&self) -> &DrawHistory {
        &self.drawn
    }

    /// Record a drawn number. Only while PLAYING; duplicates are refused.
    pub fn record_draw(&mut self, number: u8) -> bool {
        if self.state != RoomState::Playing || !self.drawn.push(number) {
            return false;
        }
        self.current_number = Some(number);
        true
    }

    // History

    pub fn win_history(&self) -> &WinHistory {
        &self.win_history
    }

    pub fn push_record(&mut self, record: WinRecord) {
        self.win_history.push(record);
    }

    /// Clear the board for a new round.
    ///
    /// Assignments stay, every ready flag drops, held players are admitted.
    pub fn reset_for_next_round(&mut self) {
        self.drawn.clear();
        self.current_number = None;
        self.state = RoomState::Waiting;

        for player in &mut self.players {
            player.ready = false;
        }

        let holding: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.seat().is_holding())
            .map(|p| p.id.clone())
            .collect();

        for player_id in holding {
            if let Some(player) = self.player_mut(&player_id) {
                if player.apply_seat(SeatEvent::Admit, Vec::new()).is_ok() {
                    self.assign_free_set(&player_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ticket::{CatalogEntry, TicketGrid};
    use pretty_assertions::assert_eq;

    fn catalog(count: u32) -> TicketCatalog {
        TicketCatalog::new(
            (1..=count)
                .map(|id| {
                    let base = (id as u8 - 1) * 5 + 1;
                    let row: Vec<u8> = (base..base + 5).collect();
                    CatalogEntry::new(id, format!("Set {id}"), "#fff", vec![TicketGrid::new(5, row)])
                })
                .collect(),
        )
    }

    fn room(sets: u32) -> Room {
        Room::new("room-1", "host", &catalog(sets), 5, 50, Utc::now())
    }

    #[test]
    fn test_room_new() {
        let room = room(3);
        assert_eq!(room.state, RoomState::Waiting);
        assert_eq!(room.sets().len(), 3);
        assert!(room.drawn().is_empty());
        assert!(!room.all_ready());
    }

    #[test]
    fn test_join_assigns_free_set() {
        let mut room = room(2);

        assert_eq!(room.join("a", "An", Utc::now()), JoinOutcome::Joined);
        assert_eq!(room.join("b", "Bao", Utc::now()), JoinOutcome::Joined);
        room.join("c", "Cuc", Utc::now());

        assert_eq!(room.player("a").unwrap().ticket_set_id(), Some(1));
        assert_eq!(room.player("b").unwrap().ticket_set_id(), Some(2));
        assert_eq!(room.player("c").unwrap().ticket_set_id(), None);
        assert!(room.sets().iter().all(SetSlot::is_taken));
    }

    #[test]
    fn test_rejoin_keeps_seat() {
        let mut room = room(2);
        room.join("a", "An", Utc::now());
        room.set_ready("a", true).unwrap();
        room.set_connected("a", false).unwrap();

        assert_eq!(room.join("a", "An B.", Utc::now()), JoinOutcome::Rejoined);
        let player = room.player("a").unwrap();
        assert_eq!(player.name, "An B.");
        assert!(player.connected);
        assert!(player.ready);
        assert_eq!(player.ticket_set_id(), Some(1));
    }

    #[test]
    fn test_select_taken_set_is_rejected_without_mutation() {
        let mut room = room(3);
        room.join("a", "An", Utc::now());
        room.join("b", "Bao", Utc::now());

        let err = room.select_set("b", 1).unwrap_err();
        assert_eq!(err, SessionError::SetTaken(1));
        assert_eq!(room.player("b").unwrap().ticket_set_id(), Some(2));
        assert_eq!(room.set(1).unwrap().taken_by.as_deref(), Some("a"));
    }

    #[test]
    fn test_select_swaps_and_releases() {
        let mut room = room(3);
        room.join("a", "An", Utc::now());

        room.select_set("a", 3).unwrap();
        assert!(!room.set(1).unwrap().is_taken());
        assert_eq!(room.set(3).unwrap().taken_by.as_deref(), Some("a"));
        assert_eq!(room.player("a").unwrap().tickets[0].cells, vec![11, 12, 13, 14, 15]);

        // Same set again is a no-op
        room.select_set("a", 3).unwrap();
        assert_eq!(room.select_set("a", 9), Err(SessionError::UnknownSet(9)));
    }

    #[test]
    fn test_ready_requires_ticket() {
        let mut room = room(1);
        room.join("a", "An", Utc::now());
        room.join("b", "Bao", Utc::now());

        assert_eq!(room.set_ready("b", true), Err(SessionError::NoTicket));
        room.set_ready("a", true).unwrap();
        assert_eq!(room.ready_count(), 1);
        assert!(!room.all_ready());
    }

    #[test]
    fn test_leave_seat_frees_set() {
        let mut room = room(1);
        room.join("a", "An", Utc::now());
        room.set_ready("a", true).unwrap();

        room.leave_seat("a").unwrap();
        let player = room.player("a").unwrap();
        assert!(!player.ready);
        assert!(!player.has_ticket());
        assert!(!room.set(1).unwrap().is_taken());
        assert_eq!(room.leave_seat("a"), Err(SessionError::NoTicket));
    }

    #[test]
    fn test_seat_locked_during_round() {
        let mut room = room(2);
        room.join("a", "An", Utc::now());
        room.state = RoomState::Playing;

        assert_eq!(room.select_set("a", 2), Err(SessionError::SeatLocked));
        assert_eq!(room.leave_seat("a"), Err(SessionError::SeatLocked));
    }

    #[test]
    fn test_mid_round_join_holds_then_admits() {
        let mut room = room(2);
        room.join("a", "An", Utc::now());
        room.state = RoomState::Playing;

        room.join("late", "Linh", Utc::now());
        let late = room.player("late").unwrap();
        assert!(late.seat().is_holding());
        assert_eq!(late.ticket_set_id(), None);
        assert_eq!(room.select_set("late", 2), Err(SessionError::Holding));

        room.state = RoomState::Ended;
        room.reset_for_next_round();

        let late = room.player("late").unwrap();
        assert!(!late.seat().is_holding());
        assert_eq!(late.ticket_set_id(), Some(2));
    }

    #[test]
    fn test_record_draw_only_while_playing() {
        let mut room = room(1);
        assert!(!room.record_draw(5));

        room.state = RoomState::Playing;
        assert!(room.record_draw(5));
        assert!(!room.record_draw(5));
        assert_eq!(room.current_number, Some(5));
        assert_eq!(room.drawn().as_slice(), &[5]);
    }

    #[test]
    fn test_remove_player_frees_set() {
        let mut room = room(1);
        room.join("a", "An", Utc::now());

        let removed = room.remove_player("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(!room.set(1).unwrap().is_taken());
        assert!(room.remove_player("a").is_none());
    }
}
