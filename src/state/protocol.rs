//! Sync protocol.
//!
//! Message contracts between the host and player devices. Every host
//! message carries enough state to overwrite the matching part of a client
//! mirror outright, so loss and duplication are harmless: the next message
//! repairs whatever was missed.
//!
//! Wire form is JSON with a `type` discriminator in kebab-case and
//! camelCase fields, e.g.
//!
//! ```json
//! {"type": "numbers-drawn", "number": 42, "history": [7, 42]}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::WinRecord;
use super::player::PlayerId;
use super::room::{Room, RoomState};
use super::ticket::TicketSet;
use super::verifier::WinningRow;

/// Player → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Identify and (re)join. Answered with a full snapshot.
    Join { player_id: PlayerId, name: String },
    /// Take a free ticket set.
    SelectSet { set_id: u32 },
    /// Set own ready flag.
    SetReady { ready: bool },
    /// Flip own ready flag.
    ToggleReady,
    /// Give the ticket set back.
    LeaveSeat,
    /// Leave the room for good.
    Leave,
    /// Claim a completed row ("Kinh!"). Marks are kept for audit only.
    Claim {
        #[serde(default)]
        marked_numbers: Vec<u8>,
    },
}

impl ClientMessage {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SelectSet { .. } => "select-set",
            Self::SetReady { .. } => "set-ready",
            Self::ToggleReady => "toggle-ready",
            Self::LeaveSeat => "leave-seat",
            Self::Leave => "leave",
            Self::Claim { .. } => "claim",
        }
    }
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    Bingo,
    FullBoard,
}

/// A ticket set as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetView {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub data: TicketSet,
    pub is_taken: bool,
    pub taken_by: Option<PlayerId>,
}

/// A player as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub ticket_set_id: Option<u32>,
    pub ready: bool,
    pub connected: bool,
    /// Arrived mid-round, no ticket until the next one
    pub holding: bool,
    pub joined_at: DateTime<Utc>,
}

/// Winner entry in `game-ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerView {
    pub id: PlayerId,
    pub name: String,
}

/// Everything a client needs to rebuild its view from nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub host_id: PlayerId,
    pub state: RoomState,
    pub round: u32,
    pub drawn_numbers: Vec<u8>,
    pub current_number: Option<u8>,
    pub draw_interval_seconds: u32,
    pub sets: Vec<SetView>,
    pub players: Vec<PlayerView>,
    pub win_history: Vec<WinRecord>,
}

impl RoomSnapshot {
    pub fn of(room: &Room) -> Self {
        Self {
            room_id: room.id.clone(),
            host_id: room.host_id.clone(),
            state: room.state,
            round: room.round,
            drawn_numbers: room.drawn().as_slice().to_vec(),
            current_number: room.current_number,
            draw_interval_seconds: room.draw_interval_seconds,
            sets: set_views(room),
            players: player_views(room),
            win_history: room.win_history().to_vec(),
        }
    }
}

pub fn set_views(room: &Room) -> Vec<SetView> {
    room.sets()
        .iter()
        .map(|s| SetView {
            id: s.id,
            name: s.name.clone(),
            color: s.color.clone(),
            data: s.grids.clone(),
            is_taken: s.is_taken(),
            taken_by: s.taken_by.clone(),
        })
        .collect()
}

pub fn player_views(room: &Room) -> Vec<PlayerView> {
    room.players()
        .map(|p| PlayerView {
            id: p.id.clone(),
            name: p.name.clone(),
            ticket_set_id: p.ticket_set_id(),
            ready: p.ready,
            connected: p.connected,
            holding: p.seat().is_holding(),
            joined_at: p.joined_at,
        })
        .collect()
}

/// Host → room or host → one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full state, sent on join and reconnect.
    Snapshot { snapshot: RoomSnapshot },
    StateChanged { state: RoomState },
    NumbersDrawn { number: u8, history: Vec<u8> },
    SetsUpdated { sets: Vec<SetView> },
    PlayersUpdated { players: Vec<PlayerView> },
    SettingsUpdated { draw_interval_seconds: u32 },
    GameEnded {
        winner: Option<WinnerView>,
        co_winners: Vec<WinnerView>,
        reason: EndReason,
        win_record: Option<WinRecord>,
    },
    GameRestarted { snapshot: RoomSnapshot },
    VerificationResult {
        player_id: PlayerId,
        success: bool,
        message: String,
        marked_numbers: Vec<u8>,
        winning_rows: Vec<WinningRow>,
    },
    /// A request was refused; only the initiator receives this.
    Rejected { code: String, message: String },
}

impl ServerMessage {
    pub fn snapshot(room: &Room) -> Self {
        Self::Snapshot {
            snapshot: RoomSnapshot::of(room),
        }
    }

    pub fn state_changed(room: &Room) -> Self {
        Self::StateChanged { state: room.state }
    }

    pub fn sets_updated(room: &Room) -> Self {
        Self::SetsUpdated {
            sets: set_views(room),
        }
    }

    pub fn players_updated(room: &Room) -> Self {
        Self::PlayersUpdated {
            players: player_views(room),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::StateChanged { .. } => "state-changed",
            Self::NumbersDrawn { .. } => "numbers-drawn",
            Self::SetsUpdated { .. } => "sets-updated",
            Self::PlayersUpdated { .. } => "players-updated",
            Self::SettingsUpdated { .. } => "settings-updated",
            Self::GameEnded { .. } => "game-ended",
            Self::GameRestarted { .. } => "game-restarted",
            Self::VerificationResult { .. } => "verification-result",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Who receives a host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Room,
    Player(PlayerId),
}

/// A host message with its addressee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub audience: Audience,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn room(message: ServerMessage) -> Self {
        Self {
            audience: Audience::Room,
            message,
        }
    }

    pub fn to(player_id: impl Into<PlayerId>, message: ServerMessage) -> Self {
        Self {
            audience: Audience::Player(player_id.into()),
            message,
        }
    }

    /// Should `player_id` receive this?
    pub fn is_for(&self, player_id: &str) -> bool {
        match &self.audience {
            Audience::Room => true,
            Audience::Player(id) => id == player_id,
        }
    }
}
