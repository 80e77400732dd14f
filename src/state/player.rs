//! Player records and the seat state machine.
//!
//! Tracks where each player stands relative to the ticket sets and
//! validates transitions.
//!
//! # Seat Diagram
//!
//! ```text
//!  join while a round runs           join while WAITING
//!          │                                │
//!          ▼                                ▼
//!   ┌─────────────┐    admit     ┌─────────────────┐
//!   │   Holding   │─────────────▶│    Choosing     │◀──────┐
//!   │ (no ticket) │ room back in │ (may pick a set)│       │ leave_seat
//!   └─────────────┘   WAITING    └────────┬────────┘       │
//!                                         │ take_set       │
//!                                         ▼                │
//!                                ┌─────────────────┐       │
//!                                │  Seated { set } │───────┘
//!                                └─────────────────┘
//!                                  │  ▲ take_set (swap)
//!                                  └──┘
//! ```
//!
//! Connectivity is orthogonal to the seat: a dropped transport marks the
//! player disconnected but keeps the seat, keyed by the stable player id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ticket::TicketSet;

/// Stable player identifier, surviving reconnects.
pub type PlayerId = String;

/// Where a player sits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seat {
    /// Arrived mid-round, waits for the room to return to WAITING
    Holding,

    /// In the lobby without a ticket set
    #[default]
    Choosing,

    /// Holding a ticket set
    Seated { set_id: u32 },
}

impl Seat {
    pub fn set_id(&self) -> Option<u32> {
        match self {
            Self::Seated { set_id } => Some(*set_id),
            _ => None,
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self, Self::Holding)
    }

    pub fn is_seated(&self) -> bool {
        matches!(self, Self::Seated { .. })
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Holding => write!(f, "Holding"),
            Self::Choosing => write!(f, "Choosing"),
            Self::Seated { set_id } => write!(f, "Seated({})", set_id),
        }
    }
}

/// Seat transition events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatEvent {
    Admit,
    TakeSet { set_id: u32 },
    LeaveSeat,
}

/// Error when a seat transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid seat transition from {from} via {event:?}: {reason}")]
pub struct InvalidSeatTransition {
    pub from: Seat,
    pub event: SeatEvent,
    pub reason: &'static str,
}

impl Seat {
    /// Calculate the seat after an event.
    pub fn transition(&self, event: &SeatEvent) -> Result<Seat, InvalidSeatTransition> {
        use Seat::*;
        use SeatEvent::*;

        let invalid = |reason: &'static str| InvalidSeatTransition {
            from: self.clone(),
            event: event.clone(),
            reason,
        };

        match (self, event) {
            (Holding, Admit) => Ok(Choosing),
            (_, Admit) => Err(invalid("Already admitted")),

            (Holding, TakeSet { .. }) => Err(invalid("Must wait for the next round")),
            (Choosing, TakeSet { set_id }) => Ok(Seated { set_id: *set_id }),
            (Seated { set_id: current }, TakeSet { set_id }) if current == set_id => {
                Err(invalid("Already holding this set"))
            }
            (Seated { .. }, TakeSet { set_id }) => Ok(Seated { set_id: *set_id }),

            (Seated { .. }, LeaveSeat) => Ok(Choosing),
            (_, LeaveSeat) => Err(invalid("Not seated")),
        }
    }
}

/// A participant in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Stable identifier
    pub id: PlayerId,

    /// Display name
    pub name: String,

    /// Seat and ticket set
    seat: Seat,

    /// Grids of the assigned set (empty when not seated)
    pub tickets: TicketSet,

    /// Ready to start
    pub ready: bool,

    /// Transport currently attached
    pub connected: bool,

    /// Consecutive rejected claims since the last win
    pub fail_streak: u32,

    /// When the player first joined
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            seat: Seat::Choosing,
            tickets: Vec::new(),
            ready: false,
            connected: true,
            fail_streak: 0,
            joined_at,
        }
    }

    /// A player arriving while a round is running.
    pub fn holding(id: impl Into<PlayerId>, name: impl Into<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            seat: Seat::Holding,
            ..Self::new(id, name, joined_at)
        }
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn ticket_set_id(&self) -> Option<u32> {
        self.seat.set_id()
    }

    pub fn has_ticket(&self) -> bool {
        self.seat.is_seated() && !self.tickets.is_empty()
    }

    /// Apply a seat event. `tickets` is the grid bundle for `TakeSet`.
    pub fn apply_seat(&mut self, event: SeatEvent, tickets: TicketSet) -> Result<(), InvalidSeatTransition> {
        self.seat = self.seat.transition(&event)?;
        match event {
            SeatEvent::TakeSet { .. } => {
                self.tickets = tickets;
                self.ready = false;
            }
            SeatEvent::LeaveSeat => {
                self.tickets.clear();
                self.ready = false;
            }
            SeatEvent::Admit => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ticket::TicketGrid;
    use pretty_assertions::assert_eq;

    fn grids() -> TicketSet {
        vec![TicketGrid::from_rows(&[&[1, 2, 3, 4, 5]])]
    }

    #[test]
    fn test_new_player_is_choosing() {
        let player = Player::new("p1", "Lan", Utc::now());
        assert_eq!(*player.seat(), Seat::Choosing);
        assert!(!player.has_ticket());
        assert!(player.connected);
    }

    #[test]
    fn test_seat_flow() {
        let mut player = Player::new("p1", "Lan", Utc::now());

        player.apply_seat(SeatEvent::TakeSet { set_id: 3 }, grids()).unwrap();
        assert_eq!(player.ticket_set_id(), Some(3));
        assert!(player.has_ticket());

        player.ready = true;
        player.apply_seat(SeatEvent::TakeSet { set_id: 4 }, grids()).unwrap();
        assert_eq!(player.ticket_set_id(), Some(4));
        assert!(!player.ready);

        player.apply_seat(SeatEvent::LeaveSeat, Vec::new()).unwrap();
        assert_eq!(*player.seat(), Seat::Choosing);
        assert!(player.tickets.is_empty());
    }

    #[test]
    fn test_holding_must_be_admitted() {
        let mut player = Player::holding("p2", "Minh", Utc::now());

        let err = player
            .apply_seat(SeatEvent::TakeSet { set_id: 1 }, grids())
            .unwrap_err();
        assert_eq!(err.from, Seat::Holding);

        player.apply_seat(SeatEvent::Admit, Vec::new()).unwrap();
        player.apply_seat(SeatEvent::TakeSet { set_id: 1 }, grids()).unwrap();
        assert!(player.has_ticket());
    }

    #[test]
    fn test_invalid_transitions() {
        let seat = Seat::Choosing;
        assert!(seat.transition(&SeatEvent::LeaveSeat).is_err());
        assert!(seat.transition(&SeatEvent::Admit).is_err());

        let seated = Seat::Seated { set_id: 2 };
        assert!(seated.transition(&SeatEvent::TakeSet { set_id: 2 }).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Seat::Seated { set_id: 7 }), "Seated(7)");
        let err = Seat::Holding.transition(&SeatEvent::LeaveSeat).unwrap_err();
        assert!(err.to_string().contains("Not seated"));
    }
}
