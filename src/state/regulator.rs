//! Draw regulator.
//!
//! Chooses the next number to reveal. A purely uniform draw makes most
//! rounds flat; a scripted one is unfair. The regulator moves through three
//! stages, strictly forward:
//!
//! ```text
//! ┌───────────┐  drawn >= K   ┌──────────────┐  every player   ┌────────────────┐
//! │ SafeInit  │──────────────▶│ WaitingPush  │────────────────▶│ NaturalFinish  │
//! │           │               │              │  has a row at   │                │
//! │ keep rows │               │ feed rows at │  4 hits         │ uniform, with  │
//! │ below 3   │               │ 3 (then 2)   │                 │ fairness bias  │
//! └───────────┘               └──────────────┘                 └────────────────┘
//! ```
//!
//! Before any stage runs, numbers that would hand a capped player a bingo
//! are removed from the pool, unless that would leave nothing to draw.
//!
//! Every branch ends in a uniform pick over a nonempty pool, so `next`
//! returns a number whenever one is left.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use super::draws::DrawHistory;
use super::player::PlayerId;
use super::ticket::{TicketGrid, BOARD_SIZE};
use super::verifier::{completes_row, RowStatus};

/// Hits at which a row counts as "waiting" (one away on a five-number row).
pub const WAITING_HITS: usize = 4;

/// During SafeInit no row may be pushed to this many hits.
pub const SAFE_INIT_LIMIT: usize = 3;

/// Regulator stage. Ordered: a regulator never moves to an earlier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Stage {
    #[default]
    SafeInit,
    WaitingPush,
    NaturalFinish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SafeInit => "safe_init",
            Self::WaitingPush => "waiting_push",
            Self::NaturalFinish => "natural_finish",
        }
    }
}

/// Fairness state handed to the regulator at the start of a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FairnessHints {
    /// Consecutive finished rounds without a win, per player
    pub streak_counts: HashMap<PlayerId, u32>,

    /// Winners of the previous round
    pub last_winner_ids: HashSet<PlayerId>,

    /// Players who must not be handed a bingo
    pub capped_player_ids: HashSet<PlayerId>,

    /// Favor the players with the longest dry spell
    pub is_special_round: bool,
}

impl FairnessHints {
    fn streak(&self, player_id: &str) -> u32 {
        self.streak_counts.get(player_id).copied().unwrap_or(0)
    }
}

/// A seated player's tickets, as seen by the regulator.
#[derive(Debug, Clone, Copy)]
pub struct SeatedTickets<'a> {
    pub player_id: &'a str,
    pub tickets: &'a [TicketGrid],
}

impl<'a> SeatedTickets<'a> {
    pub fn new(player_id: &'a str, tickets: &'a [TicketGrid]) -> Self {
        Self { player_id, tickets }
    }

    fn rows(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.tickets.iter().flat_map(|grid| grid.rows())
    }

    fn has_waiting_row(&self, drawn: &DrawHistory) -> bool {
        self.rows()
            .any(|row| RowStatus::of(row, drawn).hits >= WAITING_HITS)
    }

    /// Would drawing `number` bring any row to `limit` hits or more?
    fn pushes_to(&self, drawn: &DrawHistory, number: u8, limit: usize) -> bool {
        self.rows()
            .filter(|row| row.contains(&number))
            .any(|row| RowStatus::of(row, drawn).hits + 1 >= limit)
    }

    fn completes_with(&self, drawn: &DrawHistory, number: u8) -> bool {
        completes_row(self.tickets, drawn, number)
    }
}

/// Stateful selection policy for one round.
#[derive(Debug, Clone)]
pub struct DrawRegulator {
    k_threshold: usize,
    stage: Stage,
    hints: FairnessHints,
}

impl DrawRegulator {
    pub fn new(k_threshold: usize, hints: FairnessHints) -> Self {
        Self {
            k_threshold,
            stage: Stage::SafeInit,
            hints,
        }
    }

    /// Create with `K` drawn uniformly from `k_range`.
    pub fn with_random_threshold<R: Rng + ?Sized>(
        rng: &mut R,
        k_range: std::ops::RangeInclusive<usize>,
        hints: FairnessHints,
    ) -> Self {
        let k = if k_range.is_empty() {
            *k_range.start()
        } else {
            rng.random_range(k_range)
        };
        Self::new(k, hints)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn k_threshold(&self) -> usize {
        self.k_threshold
    }

    pub fn hints(&self) -> &FairnessHints {
        &self.hints
    }

    /// Pick the next number. `None` only once all 90 are drawn.
    pub fn next<R: Rng + ?Sized>(
        &mut self,
        players: &[SeatedTickets<'_>],
        drawn: &DrawHistory,
        rng: &mut R,
    ) -> Option<u8> {
        let remaining = drawn.remaining();
        if remaining.is_empty() {
            return None;
        }

        let pool = self.without_capped_bingos(players, drawn, remaining);
        self.stage = self.stage.max(self.observed_stage(players, drawn));

        let picked = match self.stage {
            Stage::SafeInit => self.safe_init(players, drawn, &pool, rng),
            Stage::WaitingPush => self.waiting_push(players, drawn, &pool, rng),
            Stage::NaturalFinish => self.natural_finish(players, drawn, &pool, rng),
        };
        picked.or_else(|| pool.choose(rng).copied())
    }

    fn observed_stage(&self, players: &[SeatedTickets<'_>], drawn: &DrawHistory) -> Stage {
        if drawn.len() < self.k_threshold {
            Stage::SafeInit
        } else if players.iter().all(|p| p.has_waiting_row(drawn)) {
            Stage::NaturalFinish
        } else {
            Stage::WaitingPush
        }
    }

    fn without_capped_bingos(
        &self,
        players: &[SeatedTickets<'_>],
        drawn: &DrawHistory,
        remaining: Vec<u8>,
    ) -> Vec<u8> {
        let capped: Vec<&SeatedTickets<'_>> = players
            .iter()
            .filter(|p| self.hints.capped_player_ids.contains(p.player_id))
            .collect();
        if capped.is_empty() {
            return remaining;
        }

        let filtered: Vec<u8> = remaining
            .iter()
            .copied()
            .filter(|&n| !capped.iter().any(|p| p.completes_with(drawn, n)))
            .collect();
        if filtered.is_empty() {
            // Only bingo-completing numbers are left; the round has to end somehow.
            remaining
        } else {
            filtered
        }
    }

    fn safe_init<R: Rng + ?Sized>(
        &self,
        players: &[SeatedTickets<'_>],
        drawn: &DrawHistory,
        pool: &[u8],
        rng: &mut R,
    ) -> Option<u8> {
        let safe: Vec<u8> = pool
            .iter()
            .copied()
            .filter(|&n| !players.iter().any(|p| p.pushes_to(drawn, n, SAFE_INIT_LIMIT)))
            .collect();
        safe.choose(rng).copied()
    }

    fn waiting_push<R: Rng + ?Sized>(
        &self,
        players: &[SeatedTickets<'_>],
        drawn: &DrawHistory,
        pool: &[u8],
        rng: &mut R,
    ) -> Option<u8> {
        let mut targets: Vec<&SeatedTickets<'_>> =
            players.iter().filter(|p| !p.has_waiting_row(drawn)).collect();
        if self.hints.is_special_round {
            targets = self.worst_streak(targets);
        }

        let counts = missing_numbers(&targets, drawn, pool, 3);
        let counts = if counts.is_empty() {
            missing_numbers(&targets, drawn, pool, 2)
        } else {
            counts
        };
        most_frequent(&counts, rng)
    }

    fn natural_finish<R: Rng + ?Sized>(
        &self,
        players: &[SeatedTickets<'_>],
        drawn: &DrawHistory,
        pool: &[u8],
        rng: &mut R,
    ) -> Option<u8> {
        if self.hints.is_special_round {
            let targets = self.worst_streak(players.iter().collect());
            let counts = missing_numbers(&targets, drawn, pool, WAITING_HITS);
            let counts = if counts.is_empty() {
                missing_numbers(&targets, drawn, pool, 3)
            } else {
                counts
            };
            if let Some(n) = most_frequent(&counts, rng) {
                return Some(n);
            }
        }

        if !self.hints.last_winner_ids.is_empty() {
            let recent: Vec<&SeatedTickets<'_>> = players
                .iter()
                .filter(|p| self.hints.last_winner_ids.contains(p.player_id))
                .collect();
            let mut shuffled = pool.to_vec();
            shuffled.shuffle(rng);
            return shuffled
                .iter()
                .copied()
                .find(|&n| !recent.iter().any(|p| p.completes_with(drawn, n)))
                .or_else(|| shuffled.first().copied());
        }

        None
    }

    /// Keep only the players sharing the highest non-win streak.
    fn worst_streak<'p, 'a>(
        &self,
        players: Vec<&'p SeatedTickets<'a>>,
    ) -> Vec<&'p SeatedTickets<'a>> {
        let Some(worst) = players.iter().map(|p| self.hints.streak(p.player_id)).max() else {
            return players;
        };
        players
            .into_iter()
            .filter(|p| self.hints.streak(p.player_id) == worst)
            .collect()
    }
}

/// Undrawn numbers (restricted to `pool`) that would advance a row currently
/// at exactly `hits`, counted across all target rows.
fn missing_numbers(
    targets: &[&SeatedTickets<'_>],
    drawn: &DrawHistory,
    pool: &[u8],
    hits: usize,
) -> BTreeMap<u8, usize> {
    let mut in_pool = [false; BOARD_SIZE + 1];
    for &n in pool.iter().filter(|&&n| usize::from(n) <= BOARD_SIZE) {
        in_pool[usize::from(n)] = true;
    }

    // Catalog cells outside the board can never be drawn
    let drawable = |n: u8| n != 0 && in_pool.get(usize::from(n)).copied().unwrap_or(false);

    let mut counts = BTreeMap::new();
    for row in targets.iter().flat_map(|p| p.rows()) {
        if RowStatus::of(row, drawn).hits != hits {
            continue;
        }
        for &n in row.iter().filter(|&&n| drawable(n)) {
            *counts.entry(n).or_insert(0) += 1;
        }
    }
    counts
}

/// Highest count wins; ties are broken at random.
fn most_frequent<R: Rng + ?Sized>(counts: &BTreeMap<u8, usize>, rng: &mut R) -> Option<u8> {
    let best = counts.values().copied().max()?;
    let tied: Vec<u8> = counts
        .iter()
        .filter(|(_, &c)| c == best)
        .map(|(&n, _)| n)
        .collect();
    tied.choose(rng).copied()
}
