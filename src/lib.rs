//! Lô tô Session Library
//!
//! This crate provides the host-side session engine for multi-party lô tô
//! (Vietnamese number bingo).
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Session State Machine** - One authoritative room per host, moving
//!   WAITING → PLAYING ⇄ PAUSED → BINGO_WINDOW → ENDED with validated
//!   transitions and typed rejections.
//!
//! - **Draw Regulator** - Picks each next number in three stages (safe start,
//!   push toward "waiting" rows, natural finish) so rounds build suspense
//!   while always terminating.
//!
//! - **Win Verifier** - Judges a claim against the drawn numbers only.
//!
//! - **Sync Protocol** - Messages that each carry a full slice of state, so
//!   clients recover from loss by overwriting.
//!
//! - **Client Mirror** - The player-side reducer plus a host-link watchdog
//!   that sends players back to the lobby when the host goes away.
//!
//! The `host` module runs a session on a tokio task, owning the draw timer
//! and the bingo window deadline.
//!
//! # Design Principles
//!
//! 1. **State machines validate transitions** - A rejected command leaves the
//!    room exactly as it was.
//!
//! 2. **Host-authoritative** - Clients never decide anything; they mirror.
//!
//! 3. **No networking** - Transports plug in at the host actor's channels.
//!
//! 4. **Serialization-ready** - Every wire type is serde JSON.
//!
//! # Example
//!
//! ```rust
//! use loto_session::state::{
//!     Command, HostCommand, RoomState, Session, SessionConfig,
//!     protocol::ClientMessage,
//!     ticket::{CatalogEntry, TicketCatalog, TicketGrid},
//! };
//!
//! let catalog = TicketCatalog::new(vec![CatalogEntry::new(
//!     1,
//!     "Red",
//!     "#e53935",
//!     vec![TicketGrid::new(5, vec![3, 14, 27, 41, 68])],
//! )]);
//! let mut session = Session::new("room-1", "host", &catalog, SessionConfig::default());
//!
//! let join = ClientMessage::Join { player_id: "p-1".into(), name: "Lan".into() };
//! session.apply(Command::Player { player_id: "p-1".into(), message: join }).unwrap();
//! session
//!     .apply(Command::Player {
//!         player_id: "p-1".into(),
//!         message: ClientMessage::SetReady { ready: true },
//!     })
//!     .unwrap();
//!
//! session.apply(Command::Host(HostCommand::Start)).unwrap();
//! assert_eq!(session.state(), RoomState::Playing);
//!
//! // The runtime delivers ticks for whichever timer the session installed
//! let timer = session.timer().unwrap();
//! let out = session.apply(Command::Tick { generation: timer.generation }).unwrap();
//! assert_eq!(out[0].message.kind(), "numbers-drawn");
//! ```

pub mod host;
pub mod state;

// Re-export everything from state module at crate root
pub use state::*;
