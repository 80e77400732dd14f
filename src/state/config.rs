//! Session configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Allowed range for the draw interval, in seconds.
pub const DRAW_INTERVAL_RANGE: RangeInclusive<u32> = 1..=60;

/// Default rolling history size.
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// Clamp a requested draw interval into the allowed range.
pub fn clamp_interval(seconds: u32) -> u32 {
    seconds.clamp(*DRAW_INTERVAL_RANGE.start(), *DRAW_INTERVAL_RANGE.end())
}

/// What happens after the first verified claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinPolicy {
    /// Open a grace window for simultaneous winners, then end.
    #[default]
    GraceWindow,
    /// End the round on the spot.
    ImmediateEnd,
}

impl std::str::FromStr for WinPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grace_window" | "grace" => Ok(Self::GraceWindow),
            "immediate_end" | "immediate" => Ok(Self::ImmediateEnd),
            other => Err(format!("unknown win policy '{other}'")),
        }
    }
}

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub draw_interval_seconds: u32,
    pub win_policy: WinPolicy,
    pub bingo_window_seconds: u32,
    pub max_wins_per_player: Option<u32>,
    pub special_round_streak: u32,
    pub k_min: usize,
    pub k_max: usize,
    pub history_cap: usize,
    pub host_grace_seconds: u64,
    pub lobby_countdown_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            draw_interval_seconds: 5,
            win_policy: WinPolicy::GraceWindow,
            bingo_window_seconds: 5,
            max_wins_per_player: None,
            special_round_streak: 3,
            k_min: 15,
            k_max: 25,
            history_cap: DEFAULT_HISTORY_CAP,
            host_grace_seconds: 10,
            lobby_countdown_seconds: 5,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `LOTO_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        read(&lookup, "LOTO_DRAW_INTERVAL_SECONDS", &mut config.draw_interval_seconds);
        read(&lookup, "LOTO_WIN_POLICY", &mut config.win_policy);
        read(&lookup, "LOTO_BINGO_WINDOW_SECONDS", &mut config.bingo_window_seconds);
        read(&lookup, "LOTO_SPECIAL_ROUND_STREAK", &mut config.special_round_streak);
        read(&lookup, "LOTO_K_MIN", &mut config.k_min);
        read(&lookup, "LOTO_K_MAX", &mut config.k_max);
        read(&lookup, "LOTO_HISTORY_CAP", &mut config.history_cap);
        read(&lookup, "LOTO_HOST_GRACE_SECONDS", &mut config.host_grace_seconds);
        read(&lookup, "LOTO_LOBBY_COUNTDOWN_SECONDS", &mut config.lobby_countdown_seconds);

        let mut cap = 0u32;
        if read(&lookup, "LOTO_MAX_WINS_PER_PLAYER", &mut cap) {
            config.max_wins_per_player = Some(cap);
        }

        config.normalized()
    }

    /// Clamp every field into its valid range.
    pub fn normalized(mut self) -> Self {
        self.draw_interval_seconds = clamp_interval(self.draw_interval_seconds);
        self.bingo_window_seconds = clamp_interval(self.bingo_window_seconds);
        if self.k_min > self.k_max {
            std::mem::swap(&mut self.k_min, &mut self.k_max);
        }
        self.history_cap = self.history_cap.max(1);
        self
    }

    pub fn draw_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.draw_interval_seconds))
    }

    pub fn bingo_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.bingo_window_seconds))
    }

    pub fn k_range(&self) -> RangeInclusive<usize> {
        self.k_min..=self.k_max
    }
}

fn read<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> bool {
    let Some(raw) = lookup(key) else {
        return false;
    };
    match raw.trim().parse() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            false
        }
    }
}
