//! Session state for lô tô rooms.
//!
//! This module provides the core state types and the session that drives
//! them:
//!
//! - `ticket` / `draws` - ticket grids, the catalog, and the draw history
//! - `verifier` - judges claims against drawn numbers only
//! - `regulator` - three-stage draw controller with fairness overlays
//! - `player` / `room` - seats, players, sets and the room aggregate
//! - `session` - the host-side state machine every command goes through
//! - `protocol` - wire messages between host and players
//! - `mirror` / `connection` - the player-side view and host watchdog
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Session                                  │
//! │                                                                       │
//! │  Command ──▶ apply() ──▶ Result<Vec<Outbound>, SessionError>          │
//! │                 │                                                     │
//! │     ┌───────────┼─────────────────┬─────────────────┐                 │
//! │     ▼           ▼                 ▼                 ▼                 │
//! │  ┌──────┐  ┌───────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ Room │  │ DrawRegulator │  │ check_bingo  │  │ HistoryStore │      │
//! │  │      │  │               │  │              │  │  (optional)  │      │
//! │  │ sets │  │ SAFE_INIT     │  │ drawn only,  │  └──────────────┘      │
//! │  │ players  │ WAITING_PUSH  │  │ marks never  │                       │
//! │  │ drawn│  │ NATURAL_FINISH│  │ count        │                       │
//! │  │ wins │  └───────────────┘  └──────────────┘                        │
//! │  └──────┘                                                             │
//! └──────────────────────────────────────────────────────────────────────┘
//!            │ Outbound (room or one player)
//!            ▼
//!   player device: RoomMirror.apply(msg), HostLink.host_seen(now)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use loto_session::state::{Command, HostCommand, Session, SessionConfig, TicketCatalog};
//! use loto_session::state::protocol::ClientMessage;
//!
//! let catalog = TicketCatalog::from_json(include_str!("sets.json"))?;
//! let mut session = Session::new("room-1", "host", &catalog, SessionConfig::from_env());
//!
//! session.apply(Command::Player {
//!     player_id: "p-1".into(),
//!     message: ClientMessage::Join { player_id: "p-1".into(), name: "Lan".into() },
//! })?;
//! session.apply(Command::Player {
//!     player_id: "p-1".into(),
//!     message: ClientMessage::SetReady { ready: true },
//! })?;
//! let out = session.apply(Command::Host(HostCommand::Start))?;
//! ```

pub mod clock;
pub mod config;
pub mod connection;
pub mod draws;
pub mod error;
pub mod history;
pub mod mirror;
pub mod player;
pub mod protocol;
pub mod regulator;
pub mod room;
pub mod session;
pub mod ticket;
pub mod verifier;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{SessionConfig, WinPolicy};
pub use connection::{HostLink, HostLinkStatus};
pub use draws::DrawHistory;
pub use error::SessionError;
pub use history::{ClaimOutcome, HistoryStore, MemoryHistoryStore, WinHistory, WinRecord};
pub use mirror::RoomMirror;
pub use player::{Player, PlayerId, Seat};
pub use protocol::{Audience, ClientMessage, Outbound, RoomSnapshot, ServerMessage};
pub use regulator::{DrawRegulator, FairnessHints, Stage};
pub use room::{Room, RoomState};
pub use session::{Command, HostCommand, Session, TimerSpec};
pub use ticket::{CatalogEntry, TicketCatalog, TicketGrid, TicketSet};
pub use verifier::{check_bingo, winning_rows, WinningRow};
