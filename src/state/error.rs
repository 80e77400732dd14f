//! Typed rejection reasons.
//!
//! A rejected request never mutates the room. The reason goes back to the
//! initiating client only.

use thiserror::Error;

use super::player::PlayerId;
use super::room::RoomState;

/// Why the session refused a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Start needs at least one player and every player ready.
    #[error("not every player is ready")]
    NotAllReady,

    /// Selected set belongs to someone else.
    #[error("ticket set {0} is already taken")]
    SetTaken(u32),

    /// No such set in this room's catalog.
    #[error("unknown ticket set {0}")]
    UnknownSet(u32),

    /// Action needs an assigned ticket set.
    #[error("player has no ticket set")]
    NoTicket,

    /// A join named a different player than the connection it came from.
    #[error("{sender} cannot join as {claimed}")]
    IdentityMismatch { sender: PlayerId, claimed: PlayerId },

    /// Sender has not joined this room.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Mid-round arrival asked for something only seated players can do.
    #[error("waiting for the next round")]
    Holding,

    /// Seat changes are only possible between rounds.
    #[error("seat is locked while a round is running")]
    SeatLocked,

    /// Command is not valid in the current room state.
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: RoomState,
    },

    /// Player already has a verified win this round.
    #[error("already won this round")]
    AlreadyWon,

    /// A failed claim is on screen; the host must dismiss it first.
    #[error("a verification result is awaiting dismissal")]
    VerificationPending,
}

impl SessionError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAllReady => "NOT_ALL_READY",
            Self::SetTaken(_) => "SET_TAKEN",
            Self::UnknownSet(_) => "UNKNOWN_SET",
            Self::NoTicket => "NO_TICKET",
            Self::IdentityMismatch { .. } => "IDENTITY_MISMATCH",
            Self::UnknownPlayer(_) => "UNKNOWN_PLAYER",
            Self::Holding => "HOLDING",
            Self::SeatLocked => "SEAT_LOCKED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::AlreadyWon => "ALREADY_WON",
            Self::VerificationPending => "VERIFICATION_PENDING",
        }
    }

    pub(crate) fn invalid_state(action: &'static str, state: RoomState) -> Self {
        Self::InvalidState { action, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_messages() {
        assert_eq!(SessionError::NotAllReady.code(), "NOT_ALL_READY");
        assert_eq!(SessionError::SetTaken(4).to_string(), "ticket set 4 is already taken");

        let err = SessionError::invalid_state("start", RoomState::Playing);
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(err.to_string(), "cannot start while PLAYING");
    }
}
