//! Session state machine.
//!
//! Owns one [`Room`] and drives it through a round: start, periodic draws,
//! claims, the bingo window, the end, and restart. Everything enters through
//! [`Session::apply`], which either returns the broadcasts the change
//! produced or a typed rejection with the room untouched.
//!
//! The draw timer is bookkeeping only: the session says which timer should
//! be running ([`Session::timer`]) and the runtime delivers
//! [`Command::Tick`] carrying the generation it was installed with. A tick
//! from a replaced or cancelled timer is dropped, so swapping the interval
//! can neither double-fire nor lose a draw.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::config::{clamp_interval, SessionConfig, WinPolicy};
use super::error::SessionError;
use super::history::{ClaimOutcome, HistoryStore, WinRecord};
use super::player::PlayerId;
use super::protocol::{ClientMessage, EndReason, Outbound, RoomSnapshot, ServerMessage, WinnerView};
use super::regulator::{DrawRegulator, FairnessHints, Stage};
use super::room::{JoinOutcome, Room, RoomState};
use super::ticket::TicketCatalog;
use super::verifier::{check_bingo, winning_rows};

/// Commands only the host issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Start,
    Pause,
    Resume,
    Restart,
    SetDrawInterval { seconds: u32 },
    CloseBingoWindow,
    DismissVerification,
    Kick { player_id: PlayerId },
}

/// Everything that can change a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A message from a player device
    Player {
        player_id: PlayerId,
        message: ClientMessage,
    },
    /// A host control
    Host(HostCommand),
    /// The draw timer fired
    Tick { generation: u64 },
    /// A player's transport dropped
    Disconnected { player_id: PlayerId },
}

/// The draw timer that should currently be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    pub generation: u64,
    pub period: Duration,
}

/// A failed claim is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingVerification {
    resume_playing: bool,
}

/// Host-side session for one room.
pub struct Session<R: Rng = StdRng, C: Clock = SystemClock> {
    room: Room,
    config: SessionConfig,
    regulator: Option<DrawRegulator>,
    timer: Option<TimerSpec>,
    timer_generation: u64,
    pending_verification: Option<PendingVerification>,
    round_winners: Vec<WinnerView>,
    first_win: Option<WinRecord>,
    streaks: HashMap<PlayerId, u32>,
    session_wins: HashMap<PlayerId, u32>,
    last_winner_ids: HashSet<PlayerId>,
    history_store: Option<Arc<dyn HistoryStore>>,
    rng: R,
    clock: C,
}

impl Session {
    /// Open a session with OS-seeded randomness and the system clock.
    pub fn new(
        room_id: impl Into<String>,
        host_id: impl Into<PlayerId>,
        catalog: &TicketCatalog,
        config: SessionConfig,
    ) -> Self {
        Self::with_parts(
            room_id,
            host_id,
            catalog,
            config,
            StdRng::from_os_rng(),
            SystemClock,
        )
    }
}

impl<R: Rng, C: Clock> Session<R, C> {
    pub fn with_parts(
        room_id: impl Into<String>,
        host_id: impl Into<PlayerId>,
        catalog: &TicketCatalog,
        config: SessionConfig,
        rng: R,
        clock: C,
    ) -> Self {
        let config = config.normalized();
        let room = Room::new(
            room_id,
            host_id,
            catalog,
            config.draw_interval_seconds,
            config.history_cap,
            clock.now(),
        );
        info!(room_id = %room.id, sets = room.sets().len(), "room opened");

        Self {
            room,
            config,
            regulator: None,
            timer: None,
            timer_generation: 0,
            pending_verification: None,
            round_winners: Vec::new(),
            first_win: None,
            streaks: HashMap::new(),
            session_wins: HashMap::new(),
            last_winner_ids: HashSet::new(),
            history_store: None,
            rng,
            clock,
        }
    }

    /// Mirror every judged claim to a durable store.
    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> RoomState {
        self.room.state
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::of(&self.room)
    }

    /// The draw timer that should be running, if any.
    pub fn timer(&self) -> Option<TimerSpec> {
        self.timer
    }

    /// Length of the bingo window while one is open.
    pub fn bingo_window(&self) -> Option<Duration> {
        (self.room.state == RoomState::BingoWindow).then(|| self.config.bingo_window())
    }

    pub fn regulator_stage(&self) -> Option<Stage> {
        self.regulator.as_ref().map(DrawRegulator::stage)
    }

    /// Verified winners this round, first winner first.
    pub fn round_winners(&self) -> &[WinnerView] {
        &self.round_winners
    }

    pub fn is_verification_pending(&self) -> bool {
        self.pending_verification.is_some()
    }

    /// Finished rounds in a row without a win.
    pub fn streak(&self, player_id: &str) -> u32 {
        self.streaks.get(player_id).copied().unwrap_or(0)
    }

    /// Fairness state the next round's regulator will receive.
    pub fn fairness_hints(&self) -> FairnessHints {
        let capped_player_ids = match self.config.max_wins_per_player {
            Some(cap) => self
                .session_wins
                .iter()
                .filter(|(_, &wins)| wins >= cap)
                .map(|(id, _)| id.clone())
                .collect(),
            None => HashSet::new(),
        };
        let is_special_round = self
            .room
            .players()
            .filter(|p| p.has_ticket())
            .any(|p| self.streak(&p.id) >= self.config.special_round_streak);

        FairnessHints {
            streak_counts: self.streaks.clone(),
            last_winner_ids: self.last_winner_ids.clone(),
            capped_player_ids,
            is_special_round,
        }
    }

    /// Apply a command. On error nothing changed.
    pub fn apply(&mut self, command: Command) -> Result<Vec<Outbound>, SessionError> {
        let result = match command {
            Command::Player { player_id, message } => self.handle_player(&player_id, message),
            Command::Host(host) => self.handle_host(host),
            Command::Tick { generation } => Ok(self.on_tick(generation)),
            Command::Disconnected { player_id } => self.disconnected(&player_id),
        };
        if let Err(err) = &result {
            debug!(room_id = %self.room.id, code = err.code(), %err, "command rejected");
        }
        result
    }

    fn handle_player(
        &mut self,
        player_id: &str,
        message: ClientMessage,
    ) -> Result<Vec<Outbound>, SessionError> {
        match message {
            ClientMessage::Join {
                player_id: claimed,
                name,
            } => {
                if claimed != player_id {
                    return Err(SessionError::IdentityMismatch {
                        sender: player_id.to_string(),
                        claimed,
                    });
                }
                Ok(self.join(player_id, &name))
            }
            ClientMessage::SelectSet { set_id } => {
                self.room.select_set(player_id, set_id)?;
                Ok(self.seating_changed())
            }
            ClientMessage::SetReady { ready } => self.set_ready(player_id, ready),
            ClientMessage::ToggleReady => {
                let ready = self
                    .room
                    .player(player_id)
                    .map(|p| !p.ready)
                    .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))?;
                self.set_ready(player_id, ready)
            }
            ClientMessage::LeaveSeat => {
                self.room.leave_seat(player_id)?;
                Ok(self.seating_changed())
            }
            ClientMessage::Leave => self.remove(player_id),
            ClientMessage::Claim { marked_numbers } => self.claim(player_id, marked_numbers),
        }
    }

    fn handle_host(&mut self, command: HostCommand) -> Result<Vec<Outbound>, SessionError> {
        match command {
            HostCommand::Start => self.start(),
            HostCommand::Pause => self.pause(),
            HostCommand::Resume => self.resume(),
            HostCommand::Restart => self.restart(),
            HostCommand::SetDrawInterval { seconds } => Ok(self.set_draw_interval(seconds)),
            HostCommand::CloseBingoWindow => self.close_bingo_window(),
            HostCommand::DismissVerification => self.dismiss_verification(),
            HostCommand::Kick { player_id } => self.remove(&player_id),
        }
    }

    // Membership

    fn join(&mut self, player_id: &str, name: &str) -> Vec<Outbound> {
        let rejoin = self.room.join(player_id, name, self.clock.now()) == JoinOutcome::Rejoined;
        info!(
            room_id = %self.room.id,
            player_id,
            rejoin,
            state = %self.room.state,
            "player joined"
        );

        let mut out = vec![Outbound::to(player_id, ServerMessage::snapshot(&self.room))];
        out.extend(self.seating_changed());
        out
    }

    fn disconnected(&mut self, player_id: &str) -> Result<Vec<Outbound>, SessionError> {
        self.room.set_connected(player_id, false)?;
        info!(room_id = %self.room.id, player_id, "player disconnected, seat kept");
        Ok(vec![Outbound::room(ServerMessage::players_updated(&self.room))])
    }

    fn remove(&mut self, player_id: &str) -> Result<Vec<Outbound>, SessionError> {
        self.room
            .remove_player(player_id)
            .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))?;
        info!(room_id = %self.room.id, player_id, "player left");
        Ok(self.seating_changed())
    }

    fn set_ready(&mut self, player_id: &str, ready: bool) -> Result<Vec<Outbound>, SessionError> {
        self.room.set_ready(player_id, ready)?;
        debug!(room_id = %self.room.id, player_id, ready, "ready changed");
        Ok(vec![Outbound::room(ServerMessage::players_updated(&self.room))])
    }

    fn seating_changed(&self) -> Vec<Outbound> {
        vec![
            Outbound::room(ServerMessage::sets_updated(&self.room)),
            Outbound::room(ServerMessage::players_updated(&self.room)),
        ]
    }

    // Round lifecycle

    fn start(&mut self) -> Result<Vec<Outbound>, SessionError> {
        if self.room.state != RoomState::Waiting {
            return Err(SessionError::invalid_state("start", self.room.state));
        }
        if !self.room.all_ready() {
            return Err(SessionError::NotAllReady);
        }

        let hints = self.fairness_hints();
        let regulator =
            DrawRegulator::with_random_threshold(&mut self.rng, self.config.k_range(), hints);
        info!(
            room_id = %self.room.id,
            round = self.room.round + 1,
            players = self.room.player_count(),
            k = regulator.k_threshold(),
            special = regulator.hints().is_special_round,
            "round started"
        );

        self.regulator = Some(regulator);
        self.round_winners.clear();
        self.first_win = None;
        self.pending_verification = None;
        self.room.round += 1;
        self.room.state = RoomState::Playing;
        self.install_timer();

        Ok(vec![Outbound::room(ServerMessage::state_changed(&self.room))])
    }

    fn pause(&mut self) -> Result<Vec<Outbound>, SessionError> {
        if self.room.state != RoomState::Playing {
            return Err(SessionError::invalid_state("pause", self.room.state));
        }
        self.cancel_timer();
        self.room.state = RoomState::Paused;
        info!(room_id = %self.room.id, "paused");
        Ok(vec![Outbound::room(ServerMessage::state_changed(&self.room))])
    }

    fn resume(&mut self) -> Result<Vec<Outbound>, SessionError> {
        if self.room.state != RoomState::Paused {
            return Err(SessionError::invalid_state("resume", self.room.state));
        }
        if self.pending_verification.is_some() {
            return Err(SessionError::VerificationPending);
        }
        self.resume_playing();
        Ok(vec![Outbound::room(ServerMessage::state_changed(&self.room))])
    }

    fn resume_playing(&mut self) {
        self.room.state = RoomState::Playing;
        self.install_timer();
        info!(room_id = %self.room.id, "resumed");
    }

    fn restart(&mut self) -> Result<Vec<Outbound>, SessionError> {
        if self.room.state != RoomState::Ended {
            return Err(SessionError::invalid_state("restart", self.room.state));
        }

        self.cancel_timer();
        self.regulator = None;
        self.round_winners.clear();
        self.first_win = None;
        self.pending_verification = None;
        self.room.reset_for_next_round();
        info!(room_id = %self.room.id, "room back to waiting");

        Ok(vec![Outbound::room(ServerMessage::GameRestarted {
            snapshot: RoomSnapshot::of(&self.room),
        })])
    }

    fn set_draw_interval(&mut self, seconds: u32) -> Vec<Outbound> {
        let seconds = clamp_interval(seconds);
        self.room.draw_interval_seconds = seconds;
        self.config.draw_interval_seconds = seconds;
        if self.timer.is_some() {
            self.install_timer();
        }
        info!(room_id = %self.room.id, seconds, "draw interval changed");

        vec![Outbound::room(ServerMessage::SettingsUpdated {
            draw_interval_seconds: seconds,
        })]
    }

    // Draw timer

    fn install_timer(&mut self) {
        self.timer_generation += 1;
        let spec = TimerSpec {
            generation: self.timer_generation,
            period: self.config.draw_interval(),
        };
        debug!(room_id = %self.room.id, generation = spec.generation, period = ?spec.period, "draw timer installed");
        self.timer = Some(spec);
    }

    fn cancel_timer(&mut self) {
        if let Some(spec) = self.timer.take() {
            debug!(room_id = %self.room.id, generation = spec.generation, "draw timer cancelled");
        }
    }

    fn on_tick(&mut self, generation: u64) -> Vec<Outbound> {
        let live = self.timer.map(|t| t.generation) == Some(generation);
        if !live || self.room.state != RoomState::Playing {
            debug!(room_id = %self.room.id, generation, "stale draw tick dropped");
            return Vec::new();
        }
        let Some(regulator) = self.regulator.as_mut() else {
            return Vec::new();
        };

        let seated = self.room.seated_tickets();
        let next = regulator.next(&seated, self.room.drawn(), &mut self.rng);

        let mut out = Vec::new();
        if let Some(number) = next {
            if self.room.record_draw(number) {
                debug!(room_id = %self.room.id, number, count = self.room.drawn().len(), "number drawn");
                out.push(Outbound::room(ServerMessage::NumbersDrawn {
                    number,
                    history: self.room.drawn().as_slice().to_vec(),
                }));
            }
        }
        if self.room.drawn().is_full() {
            out.extend(self.end_full_board());
        }
        out
    }

    fn end_full_board(&mut self) -> Vec<Outbound> {
        self.cancel_timer();
        self.room.state = RoomState::Ended;
        self.settle_streaks();
        info!(room_id = %self.room.id, round = self.room.round, "board exhausted without a winner");

        vec![
            Outbound::room(ServerMessage::state_changed(&self.room)),
            Outbound::room(ServerMessage::GameEnded {
                winner: None,
                co_winners: Vec::new(),
                reason: EndReason::FullBoard,
                win_record: None,
            }),
        ]
    }

    // Claims

    fn claim(&mut self, player_id: &str, marked_numbers: Vec<u8>) -> Result<Vec<Outbound>, SessionError> {
        let state = self.room.state;
        if !state.accepts_claims() {
            return Err(SessionError::invalid_state("claim", state));
        }
        let player = self
            .room
            .player(player_id)
            .ok_or_else(|| SessionError::UnknownPlayer(player_id.to_string()))?;
        if player.seat().is_holding() {
            return Err(SessionError::Holding);
        }
        if !player.has_ticket() {
            return Err(SessionError::NoTicket);
        }
        if self.round_winners.iter().any(|w| w.id == player_id) {
            return Err(SessionError::AlreadyWon);
        }
        let tickets = player.tickets.clone();
        let name = player.name.clone();
        let failures = player.fail_streak;

        // Halt the draw before judging so no number lands mid-verification.
        let was_playing = state == RoomState::Playing;
        if was_playing {
            self.cancel_timer();
            self.room.state = RoomState::Paused;
        }

        let success = check_bingo(&tickets, self.room.drawn());
        let rows = winning_rows(&tickets, self.room.drawn());
        info!(
            room_id = %self.room.id,
            player_id,
            success,
            drawn = self.room.drawn().len(),
            marked = marked_numbers.len(),
            "claim judged"
        );

        let mut out = Vec::new();
        if was_playing {
            out.push(Outbound::room(ServerMessage::state_changed(&self.room)));
        }

        if success {
            let record = self.win_record(&name, ClaimOutcome::Bingo, failures);
            if let Some(player) = self.room.player_mut(player_id) {
                player.fail_streak = 0;
            }
            *self.session_wins.entry(player_id.to_string()).or_insert(0) += 1;
            self.round_winners.push(WinnerView {
                id: player_id.to_string(),
                name: name.clone(),
            });
            self.record(record.clone());

            out.push(Outbound::room(ServerMessage::VerificationResult {
                player_id: player_id.to_string(),
                success: true,
                message: format!("Kinh! {name} has a full row"),
                marked_numbers,
                winning_rows: rows,
            }));

            if self.first_win.is_none() {
                self.first_win = Some(record);
                self.pending_verification = None;
                match self.config.win_policy {
                    WinPolicy::GraceWindow => {
                        self.cancel_timer();
                        self.room.state = RoomState::BingoWindow;
                        info!(room_id = %self.room.id, player_id, "bingo window opened");
                        out.push(Outbound::room(ServerMessage::state_changed(&self.room)));
                    }
                    WinPolicy::ImmediateEnd => out.extend(self.end_with_winners()),
                }
            }
        } else {
            let failures = failures + 1;
            if let Some(player) = self.room.player_mut(player_id) {
                player.fail_streak = failures;
            }
            let record = self.win_record(&name, ClaimOutcome::FalseClaim, failures);
            self.record(record);

            if self.room.state == RoomState::Paused {
                let resume_playing = was_playing
                    || self.pending_verification.is_some_and(|p| p.resume_playing);
                self.pending_verification = Some(PendingVerification { resume_playing });
            }

            out.push(Outbound::room(ServerMessage::VerificationResult {
                player_id: player_id.to_string(),
                success: false,
                message: format!("{name}'s claim was not confirmed"),
                marked_numbers,
                winning_rows: Vec::new(),
            }));
        }
        Ok(out)
    }

    fn dismiss_verification(&mut self) -> Result<Vec<Outbound>, SessionError> {
        let Some(pending) = self.pending_verification.take() else {
            return Err(SessionError::invalid_state("dismiss verification", self.room.state));
        };
        if pending.resume_playing && self.room.state == RoomState::Paused {
            self.resume_playing();
            return Ok(vec![Outbound::room(ServerMessage::state_changed(&self.room))]);
        }
        Ok(Vec::new())
    }

    fn close_bingo_window(&mut self) -> Result<Vec<Outbound>, SessionError> {
        if self.room.state != RoomState::BingoWindow {
            return Err(SessionError::invalid_state("close the bingo window", self.room.state));
        }
        Ok(self.end_with_winners())
    }

    fn end_with_winners(&mut self) -> Vec<Outbound> {
        self.cancel_timer();
        self.pending_verification = None;
        self.room.state = RoomState::Ended;
        self.settle_streaks();

        // Names as they were when each win was verified; winners may have left since.
        let mut winners = self.round_winners.clone();
        let winner = (!winners.is_empty()).then(|| winners.remove(0));
        info!(
            room_id = %self.room.id,
            round = self.room.round,
            winners = self.round_winners.len(),
            "round ended with bingo"
        );

        vec![
            Outbound::room(ServerMessage::state_changed(&self.room)),
            Outbound::room(ServerMessage::GameEnded {
                winner,
                co_winners: winners,
                reason: EndReason::Bingo,
                win_record: self.first_win.clone(),
            }),
        ]
    }

    /// Update non-win streaks and recent winners for a finished round.
    fn settle_streaks(&mut self) {
        let winners: HashSet<PlayerId> = self.round_winners.iter().map(|w| w.id.clone()).collect();
        for player in self.room.players().filter(|p| p.has_ticket()) {
            let streak = self.streaks.entry(player.id.clone()).or_insert(0);
            if winners.contains(&player.id) {
                *streak = 0;
            } else {
                *streak += 1;
            }
        }
        self.last_winner_ids = winners;
    }

    fn win_record(&self, name: &str, outcome: ClaimOutcome, failures: u32) -> WinRecord {
        WinRecord {
            player_name: name.to_string(),
            timestamp: self.clock.now(),
            round: self.room.round,
            outcome,
            participants_snapshot: self.room.participants(),
            failures_since_last_win: failures,
        }
    }

    fn record(&mut self, record: WinRecord) {
        if let Some(store) = &self.history_store {
            store.append(&record);
        }
        self.room.push_record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::FixedClock;
    use crate::state::history::MemoryHistoryStore;
    use crate::state::protocol::Audience;
    use crate::state::ticket::{CatalogEntry, TicketGrid};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    type TestSession = Session<StdRng, FixedClock>;

    /// Set `n` holds one row of five consecutive numbers starting at `10n + 1`.
    fn catalog() -> TicketCatalog {
        TicketCatalog::new(
            (1..=4u8)
                .map(|n| {
                    let base = n * 10 + 1;
                    let row: Vec<u8> = (base..base + 5).collect();
                    CatalogEntry::new(u32::from(n), format!("Set {n}"), "#000", vec![TicketGrid::new(5, row)])
                })
                .collect(),
        )
    }

    fn session_with(config: SessionConfig) -> TestSession {
        Session::with_parts(
            "room-1",
            "host",
            &catalog(),
            config,
            StdRng::seed_from_u64(42),
            FixedClock(Utc::now()),
        )
    }

    fn session() -> TestSession {
        session_with(SessionConfig::default())
    }

    fn player(session: &mut TestSession, id: &str, message: ClientMessage) -> Result<Vec<Outbound>, SessionError> {
        session.apply(Command::Player {
            player_id: id.to_string(),
            message,
        })
    }

    fn host(session: &mut TestSession, command: HostCommand) -> Result<Vec<Outbound>, SessionError> {
        session.apply(Command::Host(command))
    }

    fn join(session: &mut TestSession, id: &str) {
        player(
            session,
            id,
            ClientMessage::Join {
                player_id: id.to_string(),
                name: id.to_uppercase(),
            },
        )
        .unwrap();
    }

    fn ready(session: &mut TestSession, id: &str) {
        player(session, id, ClientMessage::SetReady { ready: true }).unwrap();
    }

    fn claim(session: &mut TestSession, id: &str) -> Result<Vec<Outbound>, SessionError> {
        player(session, id, ClientMessage::Claim { marked_numbers: vec![] })
    }

    /// Two seated, ready players and a running round.
    fn playing() -> TestSession {
        let mut s = session();
        join(&mut s, "a");
        join(&mut s, "b");
        ready(&mut s, "a");
        ready(&mut s, "b");
        host(&mut s, HostCommand::Start).unwrap();
        s
    }

    /// Force draws, bypassing the regulator.
    fn force_draws(session: &mut TestSession, numbers: &[u8]) {
        for &n in numbers {
            assert!(session.room.record_draw(n));
        }
    }

    fn tick(session: &mut TestSession) -> Vec<Outbound> {
        let generation = session.timer().map(|t| t.generation).unwrap_or(0);
        session.apply(Command::Tick { generation }).unwrap()
    }

    fn kinds(out: &[Outbound]) -> Vec<&'static str> {
        out.iter().map(|o| o.message.kind()).collect()
    }

    #[test]
    fn test_start_requires_everyone_ready() {
        let mut s = session();
        join(&mut s, "a");
        join(&mut s, "b");
        ready(&mut s, "a");

        assert_eq!(host(&mut s, HostCommand::Start), Err(SessionError::NotAllReady));
        assert_eq!(s.state(), RoomState::Waiting);
        assert!(s.timer().is_none());

        ready(&mut s, "b");
        let out = host(&mut s, HostCommand::Start).unwrap();
        assert_eq!(s.state(), RoomState::Playing);
        assert_eq!(kinds(&out), vec!["state-changed"]);
        assert_eq!(s.timer().unwrap().period, Duration::from_secs(5));
        assert_eq!(s.room().round, 1);
    }

    #[test]
    fn test_start_with_no_players_is_rejected() {
        let mut s = session();
        let err = host(&mut s, HostCommand::Start).unwrap_err();
        assert_eq!(err.code(), "NOT_ALL_READY");
    }

    #[test]
    fn test_join_sends_snapshot_to_joiner_only() {
        let mut s = session();
        let out = player(
            &mut s,
            "a",
            ClientMessage::Join {
                player_id: "a".into(),
                name: "An".into(),
            },
        )
        .unwrap();

        assert_eq!(kinds(&out), vec!["snapshot", "sets-updated", "players-updated"]);
        assert_eq!(out[0].audience, Audience::Player("a".into()));
        assert_eq!(out[1].audience, Audience::Room);
    }

    #[test]
    fn test_tick_draws_and_broadcasts_history() {
        let mut s = playing();

        let out = tick(&mut s);
        assert_eq!(kinds(&out), vec!["numbers-drawn"]);
        let ServerMessage::NumbersDrawn { number, history } = &out[0].message else {
            panic!("expected numbers-drawn");
        };
        assert_eq!(history, &vec![*number]);
        assert_eq!(s.room().current_number, Some(*number));
        assert_eq!(s.regulator_stage(), Some(Stage::SafeInit));
    }

    #[test]
    fn test_interval_swap_drops_old_ticks() {
        let mut s = playing();
        let old = s.timer().unwrap();

        let out = host(&mut s, HostCommand::SetDrawInterval { seconds: 0 }).unwrap();
        assert_eq!(kinds(&out), vec!["settings-updated"]);
        let new = s.timer().unwrap();
        assert_ne!(new.generation, old.generation);
        assert_eq!(new.period, Duration::from_secs(1));
        assert_eq!(s.room().draw_interval_seconds, 1);

        let stale = s.apply(Command::Tick { generation: old.generation }).unwrap();
        assert!(stale.is_empty());
        assert!(s.room().drawn().is_empty());

        let fresh = s.apply(Command::Tick { generation: new.generation }).unwrap();
        assert_eq!(kinds(&fresh), vec!["numbers-drawn"]);
        assert_eq!(s.room().drawn().len(), 1);
    }

    #[test]
    fn test_interval_change_while_waiting_installs_no_timer() {
        let mut s = session();
        host(&mut s, HostCommand::SetDrawInterval { seconds: 99 }).unwrap();
        assert!(s.timer().is_none());
        assert_eq!(s.room().draw_interval_seconds, 60);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut s = playing();
        let generation = s.timer().unwrap().generation;

        host(&mut s, HostCommand::Pause).unwrap();
        assert_eq!(s.state(), RoomState::Paused);
        assert!(s.timer().is_none());
        assert!(s.apply(Command::Tick { generation }).unwrap().is_empty());

        host(&mut s, HostCommand::Resume).unwrap();
        assert_eq!(s.state(), RoomState::Playing);
        assert!(s.timer().unwrap().generation > generation);
    }

    #[test]
    fn test_full_board_ends_round() {
        let mut s = playing();
        let mut last = Vec::new();
        for _ in 0..90 {
            last = tick(&mut s);
        }

        assert_eq!(s.room().drawn().len(), 90);
        assert_eq!(s.state(), RoomState::Ended);
        assert!(s.timer().is_none());
        assert_eq!(kinds(&last), vec!["numbers-drawn", "state-changed", "game-ended"]);
        let ServerMessage::GameEnded { winner, reason, .. } = &last[2].message else {
            panic!("expected game-ended");
        };
        assert_eq!(*winner, None);
        assert_eq!(*reason, EndReason::FullBoard);

        // Nobody won, so both streaks grow
        assert_eq!(s.streak("a"), 1);
        assert_eq!(s.streak("b"), 1);
        assert!(tick(&mut s).is_empty());
    }

    #[test]
    fn test_claim_opens_window_then_ends_with_co_winner() {
        let mut s = playing();
        // a holds 11..=15, b holds 21..=25
        force_draws(&mut s, &[11, 12, 13, 14, 15, 21, 22, 23, 24, 25]);

        let out = claim(&mut s, "a").unwrap();
        assert_eq!(kinds(&out), vec!["state-changed", "verification-result", "state-changed"]);
        assert_eq!(s.state(), RoomState::BingoWindow);
        assert!(s.timer().is_none());
        assert_eq!(s.bingo_window(), Some(Duration::from_secs(5)));

        assert_eq!(claim(&mut s, "a"), Err(SessionError::AlreadyWon));

        let out = claim(&mut s, "b").unwrap();
        assert_eq!(kinds(&out), vec!["verification-result"]);
        assert_eq!(s.state(), RoomState::BingoWindow);

        let out = host(&mut s, HostCommand::CloseBingoWindow).unwrap();
        assert_eq!(s.state(), RoomState::Ended);
        let ServerMessage::GameEnded { winner, co_winners, reason, win_record } = &out[1].message else {
            panic!("expected game-ended");
        };
        assert_eq!(winner.as_ref().map(|w| w.name.as_str()), Some("A"));
        assert_eq!(co_winners.len(), 1);
        assert_eq!(co_winners[0].id, "b");
        assert_eq!(*reason, EndReason::Bingo);
        assert_eq!(win_record.as_ref().unwrap().outcome, ClaimOutcome::Bingo);

        assert_eq!(s.room().win_history().len(), 2);
        assert_eq!(s.streak("a"), 0);
        assert_eq!(s.fairness_hints().last_winner_ids.len(), 2);
    }

    #[test]
    fn test_winning_rows_in_verification_result() {
        let mut s = playing();
        force_draws(&mut s, &[11, 12, 13, 14, 15]);

        let out = player(&mut s, "a", ClientMessage::Claim { marked_numbers: vec![11, 12] }).unwrap();
        let ServerMessage::VerificationResult { success, winning_rows, marked_numbers, .. } = &out[1].message else {
            panic!("expected verification-result");
        };
        assert!(success);
        assert_eq!(marked_numbers, &vec![11, 12]);
        assert_eq!(winning_rows[0].numbers, vec![11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_false_claim_pauses_until_dismissed() {
        let mut s = playing();
        force_draws(&mut s, &[11, 12, 13]);

        let out = player(
            &mut s,
            "a",
            ClientMessage::Claim {
                marked_numbers: vec![11, 12, 13, 14, 15],
            },
        )
        .unwrap();
        assert_eq!(kinds(&out), vec!["state-changed", "verification-result"]);
        assert_eq!(s.state(), RoomState::Paused);
        assert!(s.is_verification_pending());

        let player_a = s.room().player("a").unwrap();
        assert_eq!(player_a.fail_streak, 1);
        let last = s.room().win_history().last().unwrap();
        assert_eq!(last.outcome, ClaimOutcome::FalseClaim);
        assert_eq!(last.failures_since_last_win, 1);
        assert_eq!(last.participants_snapshot, vec!["A".to_string(), "B".to_string()]);

        assert_eq!(host(&mut s, HostCommand::Resume), Err(SessionError::VerificationPending));

        let out = host(&mut s, HostCommand::DismissVerification).unwrap();
        assert_eq!(kinds(&out), vec!["state-changed"]);
        assert_eq!(s.state(), RoomState::Playing);
        assert!(s.timer().is_some());
    }

    #[test]
    fn test_false_claim_while_host_paused_stays_paused() {
        let mut s = playing();
        host(&mut s, HostCommand::Pause).unwrap();

        claim(&mut s, "b").unwrap();
        host(&mut s, HostCommand::DismissVerification).unwrap();
        assert_eq!(s.state(), RoomState::Paused);
        assert!(s.timer().is_none());
    }

    #[test]
    fn test_failures_carry_into_win_record() {
        let mut s = playing();
        claim(&mut s, "a").unwrap();
        host(&mut s, HostCommand::DismissVerification).unwrap();
        force_draws(&mut s, &[11, 12, 13, 14, 15]);

        claim(&mut s, "a").unwrap();
        let last = s.room().win_history().last().unwrap();
        assert_eq!(last.outcome, ClaimOutcome::Bingo);
        assert_eq!(last.failures_since_last_win, 1);
        assert_eq!(s.room().player("a").unwrap().fail_streak, 0);
    }

    #[test]
    fn test_claim_rejections() {
        let mut s = session();
        join(&mut s, "a");
        assert_eq!(claim(&mut s, "a").unwrap_err().code(), "INVALID_STATE");

        let mut s = playing();
        assert_eq!(claim(&mut s, "ghost"), Err(SessionError::UnknownPlayer("ghost".into())));
    }

    #[test]
    fn test_immediate_end_policy() {
        let mut s = session_with(SessionConfig {
            win_policy: WinPolicy::ImmediateEnd,
            ..SessionConfig::default()
        });
        join(&mut s, "a");
        ready(&mut s, "a");
        host(&mut s, HostCommand::Start).unwrap();
        force_draws(&mut s, &[11, 12, 13, 14, 15]);

        let out = claim(&mut s, "a").unwrap();
        assert_eq!(s.state(), RoomState::Ended);
        assert_eq!(kinds(&out).last(), Some(&"game-ended"));
    }

    #[test]
    fn test_restart_resets_board_and_keeps_assignments() {
        let mut s = playing();
        force_draws(&mut s, &[11, 12, 13, 14, 15]);
        claim(&mut s, "a").unwrap();
        host(&mut s, HostCommand::CloseBingoWindow).unwrap();
        let history_len = s.room().win_history().len();

        let out = host(&mut s, HostCommand::Restart).unwrap();
        assert_eq!(kinds(&out), vec!["game-restarted"]);
        assert_eq!(s.state(), RoomState::Waiting);
        assert!(s.room().drawn().is_empty());
        assert_eq!(s.room().current_number, None);
        assert!(s.room().players().all(|p| !p.ready));
        assert_eq!(s.room().player("a").unwrap().ticket_set_id(), Some(1));
        assert_eq!(s.room().player("b").unwrap().tickets[0].cells, vec![21, 22, 23, 24, 25]);
        assert_eq!(s.room().win_history().len(), history_len);
        assert!(s.regulator_stage().is_none());
    }

    #[test]
    fn test_restart_only_from_ended() {
        let mut s = playing();
        assert_eq!(host(&mut s, HostCommand::Restart).unwrap_err().code(), "INVALID_STATE");
    }

    #[test]
    fn test_mid_round_join_is_held_until_waiting() {
        let mut s = playing();
        let out = player(
            &mut s,
            "late",
            ClientMessage::Join {
                player_id: "late".into(),
                name: "Linh".into(),
            },
        )
        .unwrap();

        let ServerMessage::Snapshot { snapshot } = &out[0].message else {
            panic!("expected snapshot");
        };
        let me = snapshot.players.iter().find(|p| p.id == "late").unwrap();
        assert!(me.holding);
        assert_eq!(me.ticket_set_id, None);
        assert_eq!(snapshot.state, RoomState::Playing);

        assert_eq!(
            player(&mut s, "late", ClientMessage::SelectSet { set_id: 3 }),
            Err(SessionError::Holding)
        );

        force_draws(&mut s, &[11, 12, 13, 14, 15]);
        claim(&mut s, "a").unwrap();
        host(&mut s, HostCommand::CloseBingoWindow).unwrap();
        let out = host(&mut s, HostCommand::Restart).unwrap();

        let ServerMessage::GameRestarted { snapshot } = &out[0].message else {
            panic!("expected game-restarted");
        };
        let me = snapshot.players.iter().find(|p| p.id == "late").unwrap();
        assert!(!me.holding);
        assert_eq!(me.ticket_set_id, Some(3));
    }

    #[test]
    fn test_rejected_selection_leaves_room_unchanged() {
        let mut s = session();
        join(&mut s, "a");
        join(&mut s, "b");
        let before = s.snapshot();

        assert_eq!(
            player(&mut s, "b", ClientMessage::SelectSet { set_id: 1 }),
            Err(SessionError::SetTaken(1))
        );
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_toggle_ready() {
        let mut s = session();
        join(&mut s, "a");

        player(&mut s, "a", ClientMessage::ToggleReady).unwrap();
        assert!(s.room().player("a").unwrap().ready);
        player(&mut s, "a", ClientMessage::ToggleReady).unwrap();
        assert!(!s.room().player("a").unwrap().ready);
    }

    #[test]
    fn test_disconnect_then_rejoin_keeps_seat() {
        let mut s = playing();
        s.apply(Command::Disconnected { player_id: "a".into() }).unwrap();
        assert!(!s.room().player("a").unwrap().connected);

        join(&mut s, "a");
        let a = s.room().player("a").unwrap();
        assert!(a.connected);
        assert!(a.ready);
        assert_eq!(a.ticket_set_id(), Some(1));
        assert!(!a.seat().is_holding());
    }

    #[test]
    fn test_join_cannot_take_over_another_player() {
        let mut s = playing();
        s.apply(Command::Disconnected { player_id: "a".into() }).unwrap();

        let err = player(
            &mut s,
            "mallory",
            ClientMessage::Join {
                player_id: "a".into(),
                name: "pwned".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "IDENTITY_MISMATCH");

        let a = s.room().player("a").unwrap();
        assert_eq!(a.name, "A");
        assert!(!a.connected);
        assert!(!s.room().has_player("mallory"));
    }

    #[test]
    fn test_winner_named_after_leaving_during_window() {
        let mut s = playing();
        force_draws(&mut s, &[11, 12, 13, 14, 15]);
        claim(&mut s, "a").unwrap();
        host(&mut s, HostCommand::Kick { player_id: "a".into() }).unwrap();

        let out = host(&mut s, HostCommand::CloseBingoWindow).unwrap();
        let ServerMessage::GameEnded { winner, reason, .. } = &out[1].message else {
            panic!("expected game-ended");
        };
        assert_eq!(
            *winner,
            Some(WinnerView {
                id: "a".into(),
                name: "A".into(),
            })
        );
        assert_eq!(*reason, EndReason::Bingo);
        assert_eq!(s.round_winners().len(), 1);
    }

    #[test]
    fn test_capped_winner_and_special_round_hints() {
        let mut s = session_with(SessionConfig {
            max_wins_per_player: Some(1),
            special_round_streak: 1,
            ..SessionConfig::default()
        });
        join(&mut s, "a");
        join(&mut s, "b");
        ready(&mut s, "a");
        ready(&mut s, "b");
        host(&mut s, HostCommand::Start).unwrap();
        force_draws(&mut s, &[11, 12, 13, 14, 15]);
        claim(&mut s, "a").unwrap();
        host(&mut s, HostCommand::CloseBingoWindow).unwrap();

        let hints = s.fairness_hints();
        assert!(hints.capped_player_ids.contains("a"));
        assert!(hints.last_winner_ids.contains("a"));
        assert_eq!(hints.streak_counts.get("b"), Some(&1));
        assert!(hints.is_special_round);
    }

    #[test]
    fn test_history_store_mirrors_records() {
        let store = Arc::new(MemoryHistoryStore::new());
        let mut s = playing().with_history_store(store.clone());
        claim(&mut s, "b").unwrap();

        let recent = store.recent(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].player_name, "B");
    }

    #[test]
    fn test_leave_frees_set_and_kick() {
        let mut s = session();
        join(&mut s, "a");
        join(&mut s, "b");

        player(&mut s, "a", ClientMessage::Leave).unwrap();
        assert!(!s.room().has_player("a"));
        assert!(!s.room().set(1).unwrap().is_taken());

        host(&mut s, HostCommand::Kick { player_id: "b".into() }).unwrap();
        assert_eq!(s.room().player_count(), 0);
        assert_eq!(
            host(&mut s, HostCommand::Kick { player_id: "b".into() }),
            Err(SessionError::UnknownPlayer("b".into()))
        );
    }
}
