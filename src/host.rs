//! Room actor.
//!
//! Runs one [`Session`] on its own tokio task. Player messages, host
//! controls, draw ticks and the bingo window deadline are all handled on
//! that task one at a time, so the session never needs a lock. Outbound
//! messages go to a broadcast channel; a transport subscribes and forwards
//! each [`Outbound`] to whoever it is addressed to. Delivery is
//! at-most-once and a lagging subscriber simply misses messages.

use std::future::pending;
use std::pin::Pin;

use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info};

use crate::state::clock::{Clock, SystemClock};
use crate::state::error::SessionError;
use crate::state::player::PlayerId;
use crate::state::protocol::{ClientMessage, Outbound, RoomSnapshot, ServerMessage};
use crate::state::session::{Command, HostCommand, Session};

/// Inbox depth per room.
pub const INBOX_CAPACITY: usize = 128;

/// Outbound buffer per room before slow subscribers start missing messages.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Why a request to a room did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The actor has stopped.
    #[error("room {0} is closed")]
    Closed(String),

    /// The session refused the command.
    #[error(transparent)]
    Rejected(#[from] SessionError),
}

type Reply = oneshot::Sender<Result<(), SessionError>>;

/// Requests accepted by a room actor.
#[derive(Debug)]
pub enum RoomRequest {
    Command {
        command: Command,
        reply: Option<Reply>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle for talking to a room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    sender: mpsc::Sender<RoomRequest>,
    outbound: broadcast::Sender<Outbound>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Receive every message the room sends from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound.subscribe()
    }

    /// Apply a command and wait for the verdict.
    pub async fn execute(&self, command: Command) -> Result<(), HostError> {
        let (reply, verdict) = oneshot::channel();
        self.request(RoomRequest::Command {
            command,
            reply: Some(reply),
        })
        .await?;
        verdict.await.map_err(|_| self.closed())?.map_err(HostError::from)
    }

    /// Apply a command without waiting. Rejections still reach the
    /// initiator as a `rejected` message.
    pub async fn send(&self, command: Command) -> Result<(), HostError> {
        self.request(RoomRequest::Command {
            command,
            reply: None,
        })
        .await
    }

    pub async fn player(
        &self,
        player_id: impl Into<PlayerId>,
        message: ClientMessage,
    ) -> Result<(), HostError> {
        self.execute(Command::Player {
            player_id: player_id.into(),
            message,
        })
        .await
    }

    pub async fn host(&self, command: HostCommand) -> Result<(), HostError> {
        self.execute(Command::Host(command)).await
    }

    /// The transport lost this player.
    pub async fn disconnected(&self, player_id: impl Into<PlayerId>) -> Result<(), HostError> {
        self.send(Command::Disconnected {
            player_id: player_id.into(),
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, HostError> {
        let (reply, snapshot) = oneshot::channel();
        self.request(RoomRequest::Snapshot { reply }).await?;
        snapshot.await.map_err(|_| self.closed())
    }

    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.request(RoomRequest::Shutdown).await
    }

    async fn request(&self, request: RoomRequest) -> Result<(), HostError> {
        self.sender.send(request).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> HostError {
        HostError::Closed(self.room_id.clone())
    }
}

/// Draw timer as currently installed, keyed by session generation.
struct DrawTimer {
    generation: u64,
    interval: Interval,
}

/// Owns a session and serializes everything that touches it.
pub struct RoomActor<R: Rng = StdRng, C: Clock = SystemClock> {
    session: Session<R, C>,
    inbox: mpsc::Receiver<RoomRequest>,
    outbound: broadcast::Sender<Outbound>,
    draw_timer: Option<DrawTimer>,
    bingo_window: Option<Pin<Box<Sleep>>>,
}

impl<R, C> RoomActor<R, C>
where
    R: Rng + Send + 'static,
    C: Clock + 'static,
{
    pub fn new(session: Session<R, C>) -> (Self, RoomHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        let handle = RoomHandle {
            room_id: session.room().id.clone(),
            sender,
            outbound: outbound.clone(),
        };

        let actor = Self {
            session,
            inbox,
            outbound,
            draw_timer: None,
            bingo_window: None,
        };
        (actor, handle)
    }

    /// Run the actor on the current runtime.
    pub fn spawn(session: Session<R, C>) -> RoomHandle {
        let (actor, handle) = Self::new(session);
        tokio::spawn(actor.run());
        handle
    }

    /// Event loop. Returns on shutdown or when every handle is gone.
    pub async fn run(mut self) {
        let room_id = self.session.room().id.clone();
        info!(%room_id, "room actor started");

        loop {
            self.sync_timers();

            tokio::select! {
                request = self.inbox.recv() => match request {
                    Some(RoomRequest::Command { command, reply }) => self.dispatch(command, reply),
                    Some(RoomRequest::Snapshot { reply }) => {
                        let _ = reply.send(self.session.snapshot());
                    }
                    Some(RoomRequest::Shutdown) | None => break,
                },

                generation = next_tick(&mut self.draw_timer) => {
                    self.dispatch(Command::Tick { generation }, None);
                }

                _ = window_elapsed(&mut self.bingo_window) => {
                    self.bingo_window = None;
                    debug!(%room_id, "bingo window elapsed");
                    self.dispatch(Command::Host(HostCommand::CloseBingoWindow), None);
                }
            }
        }

        info!(%room_id, "room actor stopped");
    }

    /// Bring the real timers in line with what the session wants running.
    fn sync_timers(&mut self) {
        match self.session.timer() {
            Some(spec) => {
                let current = self.draw_timer.as_ref().map(|t| t.generation);
                if current != Some(spec.generation) {
                    let mut interval = time::interval_at(Instant::now() + spec.period, spec.period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.draw_timer = Some(DrawTimer {
                        generation: spec.generation,
                        interval,
                    });
                }
            }
            None => self.draw_timer = None,
        }

        match self.session.bingo_window() {
            Some(length) => {
                if self.bingo_window.is_none() {
                    self.bingo_window = Some(Box::pin(time::sleep(length)));
                }
            }
            None => self.bingo_window = None,
        }
    }

    fn dispatch(&mut self, command: Command, reply: Option<Reply>) {
        let initiator = self.initiator_of(&command);

        let verdict = match self.session.apply(command) {
            Ok(out) => {
                for message in out {
                    // No subscribers is not an error
                    let _ = self.outbound.send(message);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(player_id) = initiator {
                    let _ = self.outbound.send(Outbound::to(
                        player_id,
                        ServerMessage::Rejected {
                            code: err.code().to_string(),
                            message: err.to_string(),
                        },
                    ));
                }
                Err(err)
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(verdict);
        }
    }

    /// Who hears about a rejection. Timer events have nobody to tell.
    fn initiator_of(&self, command: &Command) -> Option<PlayerId> {
        match command {
            Command::Player { player_id, .. } => Some(player_id.clone()),
            Command::Host(_) => Some(self.session.room().host_id.clone()),
            Command::Tick { .. } | Command::Disconnected { .. } => None,
        }
    }
}

async fn next_tick(timer: &mut Option<DrawTimer>) -> u64 {
    match timer {
        Some(timer) => {
            timer.interval.tick().await;
            timer.generation
        }
        None => pending().await,
    }
}

async fn window_elapsed(window: &mut Option<Pin<Box<Sleep>>>) {
    match window {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
