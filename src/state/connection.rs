//! Host link tracking on a player device.
//!
//! Transport loss starts a grace period. If the host is not heard from again
//! before it runs out, the player sees "host disconnected" and a countdown,
//! then is sent back to the lobby. Any host message during grace or
//! countdown restores the link.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::config::SessionConfig;

/// Default grace period before surfacing a lost host (10 seconds).
pub const DEFAULT_HOST_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default countdown before returning to the lobby (5 seconds).
pub const DEFAULT_LOBBY_COUNTDOWN: Duration = Duration::from_secs(5);

/// Link status as the player UI sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLinkStatus {
    /// Host reachable
    Connected,

    /// Transport lost, within grace period; not yet shown to the player
    Reconnecting {
        since: Instant,
        grace_until: Instant,
    },

    /// Shown to the player, counting down to the lobby
    HostDisconnected {
        since: Instant,
        lobby_at: Instant,
    },

    /// Gave up; the player belongs in the lobby
    ReturnToLobby,
}

impl HostLinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Should the "host disconnected" banner be up?
    pub fn is_host_disconnected(&self) -> bool {
        matches!(self, Self::HostDisconnected { .. })
    }

    pub fn should_return_to_lobby(&self) -> bool {
        matches!(self, Self::ReturnToLobby)
    }
}

/// Watchdog for one player's link to the host.
#[derive(Debug, Clone)]
pub struct HostLink {
    status: HostLinkStatus,
    grace_period: Duration,
    lobby_countdown: Duration,
    last_seen: Option<Instant>,
}

impl Default for HostLink {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_GRACE_PERIOD, DEFAULT_LOBBY_COUNTDOWN)
    }
}

impl HostLink {
    pub fn new(grace_period: Duration, lobby_countdown: Duration) -> Self {
        Self {
            status: HostLinkStatus::Connected,
            grace_period,
            lobby_countdown,
            last_seen: None,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.host_grace_seconds),
            Duration::from_secs(config.lobby_countdown_seconds),
        )
    }

    pub fn status(&self) -> HostLinkStatus {
        self.status
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    /// A host message arrived. Returns true if this restored a lost link.
    pub fn host_seen(&mut self, now: Instant) -> bool {
        self.last_seen = Some(now);
        match self.status {
            HostLinkStatus::Reconnecting { .. } | HostLinkStatus::HostDisconnected { .. } => {
                info!("host link restored");
                self.status = HostLinkStatus::Connected;
                true
            }
            HostLinkStatus::Connected | HostLinkStatus::ReturnToLobby => false,
        }
    }

    /// The transport reported the host gone. Repeats are ignored.
    pub fn host_lost(&mut self, now: Instant) {
        if self.status.is_connected() {
            self.status = HostLinkStatus::Reconnecting {
                since: now,
                grace_until: now + self.grace_period,
            };
        }
    }

    /// Advance timeouts and return the resulting status.
    pub fn poll(&mut self, now: Instant) -> HostLinkStatus {
        match self.status {
            HostLinkStatus::Reconnecting { since, grace_until } if now >= grace_until => {
                warn!(silent_for = ?now.duration_since(since), "host disconnected");
                self.status = HostLinkStatus::HostDisconnected {
                    since,
                    lobby_at: grace_until + self.lobby_countdown,
                };
                // A long gap between polls can skip the countdown entirely
                return self.poll(now);
            }
            HostLinkStatus::HostDisconnected { lobby_at, .. } if now >= lobby_at => {
                info!("returning to lobby");
                self.status = HostLinkStatus::ReturnToLobby;
            }
            _ => {}
        }
        self.status
    }

    /// Time left on the lobby countdown, while it runs.
    pub fn countdown_remaining(&self, now: Instant) -> Option<Duration> {
        match self.status {
            HostLinkStatus::HostDisconnected { lobby_at, .. } => {
                Some(lobby_at.saturating_duration_since(now))
            }
            _ => None,
        }
    }

    /// Start over after the player is back in the lobby.
    pub fn reset(&mut self) {
        self.status = HostLinkStatus::Connected;
        self.last_seen = None;
    }
}
