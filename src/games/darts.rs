use super::{GameState, Validate};
use crate::error::DartsError;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Highest value accepted for a single dart. This is the input range of the
// scoring sheet, not the board maximum of 60.
pub const MAX_DART: u32 = 180;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "301")]
    ThreeOhOne,
    #[serde(rename = "501")]
    FiveOhOne,
}

impl Variant {
    pub fn starting_score(self) -> i32 {
        match self {
            Variant::ThreeOhOne => 301,
            Variant::FiveOhOne => 501,
        }
    }

    pub fn requires_double_in(self) -> bool {
        matches!(self, Variant::ThreeOhOne)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.starting_score())
    }
}

impl FromStr for Variant {
    type Err = DartsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "301" => Ok(Variant::ThreeOhOne),
            "501" => Ok(Variant::FiveOhOne),
            other => Err(DartsError::input(format!("unknown variant '{}', expected 301 or 501", other))),
        }
    }
}

// Parse one dart field as typed by the operator. An empty field counts as a
// miss.
pub fn parse_dart(text: &str) -> Result<u32, DartsError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }

    let value: u32 = text
        .parse()
        .map_err(|_| DartsError::input(format!("'{}' is not a dart score", text)))?;

    if value > MAX_DART {
        return Err(DartsError::input(format!("dart score {} outside [0, {}]", value, MAX_DART)));
    }

    Ok(value)
}

// A remaining score that cannot stand after a turn: an overshoot, or 1 which
// can never be checked out on a double.
pub fn is_bust_candidate(candidate: i32) -> bool {
    candidate < 0 || candidate == 1
}

// Three darts as submitted for one turn, plus whether the turn hit the double
// that matters (double-in or checkout).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Turn {
    pub darts: [u32; 3],
    pub is_double: bool,
}

impl Turn {
    pub fn new(darts: [u32; 3], is_double: bool) -> Self {
        Self { darts, is_double }
    }

    pub fn total(&self) -> u32 {
        self.darts.iter().sum()
    }

    fn check_range(&self) -> Result<(), DartsError> {
        for (i, &dart) in self.darts.iter().enumerate() {
            if dart > MAX_DART {
                return Err(DartsError::input(format!(
                    "dart {} scored {}, outside [0, {}]",
                    i + 1,
                    dart,
                    MAX_DART
                )));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TurnRequest {
    pub variant: Variant,
    pub start_score: i32,
    pub darts: [u32; 3],
    pub is_double: bool,
    pub double_in_satisfied: bool,
}

// Why a turn was thrown away
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BustReason {
    NoDoubleIn,
    Overshoot,
    LeftOnOne,
    NoDoubleOut,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub remaining: i32,
    pub bust: Option<BustReason>,
    pub winner: bool,
    pub double_in_satisfied: bool,
}

impl Resolution {
    pub fn is_bust(&self) -> bool {
        self.bust.is_some()
    }
}

// Decide the outcome of one turn. Pure: nothing is mutated and a bust is a
// normal outcome, only malformed darts are an error.
//
// The order of the checks is the rule. A player still waiting on double-in
// who hits a double takes the candidate as-is, without the bust checks of the
// standard branch.
pub fn resolve(request: &TurnRequest) -> Result<Resolution, DartsError> {
    let turn = Turn::new(request.darts, request.is_double);
    turn.check_range()?;

    let start = request.start_score;
    let candidate = start - turn.total() as i32;
    let doubled_in = request.double_in_satisfied || !request.variant.requires_double_in();

    let bust = |reason| Resolution {
        remaining: start,
        bust: Some(reason),
        winner: false,
        double_in_satisfied: doubled_in,
    };

    if !doubled_in {
        if request.is_double {
            return Ok(Resolution {
                remaining: candidate,
                bust: None,
                winner: false,
                double_in_satisfied: true,
            });
        }
        return Ok(bust(BustReason::NoDoubleIn));
    }

    let resolution = match candidate {
        c if c < 0 => bust(BustReason::Overshoot),
        1 => bust(BustReason::LeftOnOne),
        0 if request.is_double => Resolution {
            remaining: 0,
            bust: None,
            winner: true,
            double_in_satisfied: true,
        },
        // Must finish on a double
        0 => bust(BustReason::NoDoubleOut),
        c => Resolution {
            remaining: c,
            bust: None,
            winner: false,
            double_in_satisfied: true,
        },
    };

    Ok(resolution)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    NeedsDoubleIn,
    Active,
    Won,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerState {
    pub name: String,
    pub remaining: i32,
    pub double_in: bool,
    pub busts: u32,
}

impl PlayerState {
    fn new(name: String, variant: Variant) -> Self {
        Self {
            name,
            remaining: variant.starting_score(),
            double_in: !variant.requires_double_in(),
            busts: 0,
        }
    }
}

// First entry written for a match. Enough to rebuild the roster before anyone
// has thrown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStarted {
    pub match_id: Uuid,
    pub variant: Variant,
    pub players: Vec<String>,
    pub started_at: DateTime<Utc>,
}

// One resolved turn as handed to the throw log. Keyed by match, turn number
// and player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowRecord {
    pub match_id: Uuid,
    pub match_started_at: DateTime<Utc>,
    pub variant: Variant,
    pub player: String,
    pub turn_number: u32,
    pub darts: [u32; 3],
    pub total: u32,
    pub remaining: i32,
    pub double: bool,
    pub bust: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bust_reason: Option<BustReason>,
    pub winner: Option<String>,
    pub thrown_at: DateTime<Utc>,
}

impl ThrowRecord {
    // Same turn with the same result, ignoring when it was recorded. Older
    // lines carry no bust reason, only the flag.
    fn same_outcome(&self, other: &ThrowRecord) -> bool {
        self.variant == other.variant
            && self.player == other.player
            && self.turn_number == other.turn_number
            && self.darts == other.darts
            && self.total == other.total
            && self.remaining == other.remaining
            && self.double == other.double
            && self.bust == other.bust
            && (other.bust_reason.is_none() || self.bust_reason == other.bust_reason)
            && self.winner == other.winner
    }
}

#[derive(Clone, Debug)]
pub struct Match {
    id: Uuid,
    started_at: DateTime<Utc>,
    variant: Variant,
    players: Vec<PlayerState>,
    turn_number: u32,
    current: usize,
    winner: Option<usize>,
}

impl Match {
    // Start a fresh match. Names are trimmed and blank ones dropped; at least
    // two distinct names must remain.
    pub fn start<I, S>(variant: Variant, names: I) -> Result<Self, DartsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_identity(Uuid::new_v4(), Utc::now(), variant, names)
    }

    fn with_identity<I, S>(id: Uuid, started_at: DateTime<Utc>, variant: Variant, names: I) -> Result<Self, DartsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut players = Vec::new();

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if !seen.insert(name.to_string()) {
                return Err(DartsError::setup(format!("player '{}' entered twice", name)));
            }
            players.push(PlayerState::new(name.to_string(), variant));
        }

        if players.len() < 2 {
            return Err(DartsError::setup(format!(
                "at least 2 players are needed, got {}",
                players.len()
            )));
        }

        Ok(Self {
            id,
            started_at,
            variant,
            players,
            turn_number: 1,
            current: 0,
            winner: None,
        })
    }

    // Rebuild a match from its log by replaying every throw through the
    // resolver. The log must agree with the replay turn by turn.
    pub fn restore(started: &MatchStarted, throws: &[ThrowRecord]) -> Result<Self, DartsError> {
        let mut game = Self::with_identity(started.match_id, started.started_at, started.variant, &started.players)?;

        for record in throws {
            if record.match_id != game.id {
                return Err(DartsError::state(format!(
                    "throw for match {} found in history of match {}",
                    record.match_id, game.id
                )));
            }
            if record.turn_number != game.turn_number {
                return Err(DartsError::state(format!(
                    "expected turn {}, log continues with turn {}",
                    game.turn_number, record.turn_number
                )));
            }
            if record.player != game.current().name {
                return Err(DartsError::state(format!(
                    "turn {} belongs to {}, log says {}",
                    record.turn_number,
                    game.current().name,
                    record.player
                )));
            }

            let turn = Turn::new(record.darts, record.double);
            let (resolution, replayed) = game.resolve_turn(&turn)?;
            if !replayed.same_outcome(record) {
                return Err(DartsError::state(format!(
                    "turn {} in the log does not match its replay",
                    record.turn_number
                )));
            }
            game.apply_resolved_turn(&resolution)?;
        }

        Ok(game)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    pub fn current(&self) -> &PlayerState {
        &self.players[self.current]
    }

    pub fn winner(&self) -> Option<&PlayerState> {
        self.winner.map(|idx| &self.players[idx])
    }

    pub fn phase(&self, player_idx: usize) -> Phase {
        if self.winner == Some(player_idx) {
            Phase::Won
        } else if !self.players[player_idx].double_in {
            Phase::NeedsDoubleIn
        } else {
            Phase::Active
        }
    }

    pub fn started(&self) -> MatchStarted {
        MatchStarted {
            match_id: self.id,
            variant: self.variant,
            players: self.players.iter().map(|p| p.name.clone()).collect(),
            started_at: self.started_at,
        }
    }

    fn ensure_running(&self) -> Result<(), DartsError> {
        match self.winner() {
            Some(winner) => Err(DartsError::state(format!("match already won by {}", winner.name))),
            None => Ok(()),
        }
    }

    // Resolver input for the active player
    pub fn request(&self, turn: &Turn) -> Result<TurnRequest, DartsError> {
        self.ensure_running()?;
        let player = self.current();

        Ok(TurnRequest {
            variant: self.variant,
            start_score: player.remaining,
            darts: turn.darts,
            is_double: turn.is_double,
            double_in_satisfied: player.double_in,
        })
    }

    // Resolve a turn for the active player and build its record. The match is
    // left untouched until `apply_resolved_turn`.
    pub fn resolve_turn(&self, turn: &Turn) -> Result<(Resolution, ThrowRecord), DartsError> {
        let request = self.request(turn)?;
        let resolution = resolve(&request)?;
        let player = self.current();

        let record = ThrowRecord {
            match_id: self.id,
            match_started_at: self.started_at,
            variant: self.variant,
            player: player.name.clone(),
            turn_number: self.turn_number,
            darts: turn.darts,
            total: turn.total(),
            remaining: resolution.remaining,
            double: turn.is_double,
            bust: resolution.is_bust(),
            bust_reason: resolution.bust,
            winner: resolution.winner.then(|| player.name.clone()),
            thrown_at: Utc::now(),
        };

        Ok((resolution, record))
    }

    pub fn apply_resolved_turn(&mut self, resolution: &Resolution) -> Result<(), DartsError> {
        self.ensure_running()?;

        let idx = self.current;
        let player = &mut self.players[idx];
        player.remaining = resolution.remaining;
        player.double_in |= resolution.double_in_satisfied;
        if resolution.is_bust() {
            player.busts += 1;
        }

        self.turn_number += 1;
        if resolution.winner {
            self.winner = Some(idx);
        } else {
            self.current = (idx + 1) % self.players.len();
        }

        Ok(())
    }
}

impl GameState for Match {
    fn n_players(&self) -> usize {
        self.players.len()
    }

    fn current_player(&self) -> usize {
        self.current
    }

    fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }
}

impl Validate for Match {
    fn validate(&self) -> Result<()> {
        let n_players = self.players.len();
        if n_players < 2 {
            return Err(anyhow!("Number of players ({}) below 2", n_players));
        }

        let names: HashSet<&str> = self.players.iter().map(|p| p.name.as_str()).collect();
        if names.len() != n_players {
            return Err(anyhow!("Player names are not unique"));
        }

        if self.current >= n_players {
            return Err(anyhow!("Current player {} outside roster of {}", self.current, n_players));
        }

        let start = self.variant.starting_score();
        for p in &self.players {
            // No lower bound: a double-in turn may overshoot
            if p.remaining > start {
                return Err(anyhow!("{} has {} left, above the starting {}", p.name, p.remaining, start));
            }
            if !self.variant.requires_double_in() && !p.double_in {
                return Err(anyhow!("{} is waiting on double-in in a {} game", p.name, self.variant));
            }
            if p.busts >= self.turn_number {
                return Err(anyhow!("{} has {} busts after {} turns", p.name, p.busts, self.turn_number - 1));
            }
        }

        if let Some(idx) = self.winner {
            if idx != self.current || self.players[idx].remaining != 0 {
                return Err(anyhow!("Winner {} is not the finishing player", self.players[idx].name));
            }
        }

        Ok(())
    }
}
