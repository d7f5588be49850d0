//! Round aggregate and the value types it is built from.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use super::{errors::GameError, rules};

/// Chat room identifier. Also the destination for every outbound effect.
pub type RoomId = i64;

/// Chat participant identifier.
pub type ParticipantId = i64;

/// Face value of one die, 1 through 6.
pub type DieValue = u8;

/// Abstract points. Nothing here is ever settled for real money.
pub type Points = i64;

/// Maximum number of draws a side can hold.
pub const MAX_DRAWS_PER_SIDE: usize = 3;

/// Valid range of a die face.
pub const DIE_FACES: std::ops::RangeInclusive<DieValue> = 1..=6;

/// Identifier of one round.
///
/// Built from a zero-padded millisecond timestamp followed by a random suffix,
/// so ids sort in creation order and never collide across restarts.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct RoundId(String);

impl RoundId {
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{:013}-{}", now.timestamp_millis(), &suffix[..8]))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RoundId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The two competing hands.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Side {
    /// Banker analog.
    A,
    /// Player analog.
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::A => "Banker",
            Self::B => "Player",
        };
        write!(f, "{repr}")
    }
}

/// Outcome classes a participant can stake on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BetClass {
    SideA,
    SideB,
    Tie,
}

impl BetClass {
    pub const ALL: [Self; 3] = [Self::SideA, Self::SideB, Self::Tie];
}

impl fmt::Display for BetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::SideA => "Banker",
            Self::SideB => "Player",
            Self::Tie => "Tie",
        };
        write!(f, "{repr}")
    }
}

impl FromStr for BetClass {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "side_a" | "banker" => Ok(Self::SideA),
            "b" | "side_b" | "player" => Ok(Self::SideB),
            "tie" | "t" => Ok(Self::Tie),
            other => Err(GameError::InvalidBetClass(other.to_string())),
        }
    }
}

/// Lifecycle phase of a persisted round. Idle is the absence of a round.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Phase {
    Betting,
    Dealing,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Betting => "betting",
            Self::Dealing => "dealing",
            Self::Finished => "finished",
        };
        write!(f, "{repr}")
    }
}

/// Per-round ceilings on stakes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BetLimits {
    /// Ceiling on one participant's stake in one class.
    pub max_per_class: Points,
    /// Ceiling on one participant's stake summed over all classes.
    pub max_total: Points,
}

/// Everything one participant has staked this round.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ParticipantBets {
    pub display_name: String,
    pub stakes: BTreeMap<BetClass, Points>,
}

impl ParticipantBets {
    #[must_use]
    pub fn stake(&self, class: BetClass) -> Points {
        self.stakes.get(&class).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> Points {
        self.stakes.values().sum()
    }
}

/// Draw sequences for both sides, in draw order.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Draws {
    pub a: Vec<DieValue>,
    pub b: Vec<DieValue>,
}

impl Draws {
    #[must_use]
    pub fn side(&self, side: Side) -> &[DieValue] {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    /// Appends a draw. Returns false, leaving the hand untouched, if the side
    /// already holds [`MAX_DRAWS_PER_SIDE`] values.
    pub fn push(&mut self, side: Side, value: DieValue) -> bool {
        let hand = match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        };
        if hand.len() >= MAX_DRAWS_PER_SIDE {
            return false;
        }
        hand.push(value);
        true
    }

    #[must_use]
    pub fn total(&self, side: Side) -> u8 {
        rules::total(self.side(side))
    }

    /// Third value drawn by a side, if any.
    #[must_use]
    pub fn third(&self, side: Side) -> Option<DieValue> {
        self.side(side).get(2).copied()
    }
}

/// Final totals and the winning class.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Outcome {
    pub total_a: u8,
    pub total_b: u8,
    pub winner: BetClass,
}

impl Outcome {
    #[must_use]
    pub fn from_draws(draws: &Draws) -> Self {
        let total_a = draws.total(Side::A);
        let total_b = draws.total(Side::B);
        Self {
            total_a,
            total_b,
            winner: rules::winner(total_a, total_b),
        }
    }
}

/// Net result of one participant for a finished round.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Settlement {
    pub participant: ParticipantId,
    pub display_name: String,
    pub staked: Points,
    /// Points won minus points lost.
    pub net: Points,
}

/// One round of dice baccarat for one room.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Game {
    pub round_id: RoundId,
    pub room_id: RoomId,
    pub phase: Phase,
    pub bets: BTreeMap<ParticipantId, ParticipantBets>,
    pub draws: Draws,
    pub outcome: Option<Outcome>,
    pub betting_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Game {
    /// Opens a new round in the betting phase.
    #[must_use]
    pub fn new(room_id: RoomId, betting_window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            round_id: RoundId::generate(now),
            room_id,
            phase: Phase::Betting,
            bets: BTreeMap::new(),
            draws: Draws::default(),
            outcome: None,
            betting_deadline: now + betting_window,
            created_at: now,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Whether `now` is at or past the betting deadline.
    #[must_use]
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.betting_deadline
    }

    #[must_use]
    pub fn stake(&self, participant: ParticipantId, class: BetClass) -> Points {
        self.bets
            .get(&participant)
            .map(|b| b.stake(class))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn participant_total(&self, participant: ParticipantId) -> Points {
        self.bets.get(&participant).map(ParticipantBets::total).unwrap_or(0)
    }

    /// Sum of all stakes in the round.
    #[must_use]
    pub fn total_staked(&self) -> Points {
        self.bets.values().map(ParticipantBets::total).sum()
    }

    /// Sum of stakes per class, across participants.
    #[must_use]
    pub fn class_totals(&self) -> BTreeMap<BetClass, Points> {
        let mut totals = BTreeMap::new();
        for bets in self.bets.values() {
            for (class, amount) in &bets.stakes {
                *totals.entry(*class).or_insert(0) += amount;
            }
        }
        totals
    }

    /// Validates and records a stake.
    ///
    /// On error the round is left untouched.
    ///
    /// # Errors
    ///
    /// Phase and deadline conflicts, non-positive amounts and ceiling
    /// violations.
    pub fn place_bet(
        &mut self,
        participant: ParticipantId,
        display_name: &str,
        class: BetClass,
        amount: Points,
        limits: &BetLimits,
        now: DateTime<Utc>,
    ) -> Result<(), GameError> {
        if self.phase != Phase::Betting {
            return Err(GameError::BettingClosed);
        }
        if self.deadline_passed(now) {
            return Err(GameError::BettingDeadlinePassed);
        }
        if amount <= 0 {
            return Err(GameError::InvalidAmount(amount));
        }

        let current = self.stake(participant, class);
        let class_stake = current
            .checked_add(amount)
            .filter(|stake| *stake <= limits.max_per_class)
            .ok_or_else(|| GameError::ClassLimitExceeded {
                class,
                current,
                limit: limits.max_per_class,
                overflow: current
                    .saturating_add(amount)
                    .saturating_sub(limits.max_per_class),
            })?;

        let current_total = self.participant_total(participant);
        current_total
            .checked_add(amount)
            .filter(|total| *total <= limits.max_total)
            .ok_or_else(|| GameError::TotalLimitExceeded {
                current: current_total,
                limit: limits.max_total,
                overflow: current_total
                    .saturating_add(amount)
                    .saturating_sub(limits.max_total),
            })?;

        let entry = self.bets.entry(participant).or_default();
        entry.display_name = display_name.to_string();
        entry.stakes.insert(class, class_stake);
        Ok(())
    }

    /// Net result per participant. Empty until the round has an outcome.
    ///
    /// A stake on the winning class pays its amount times the class
    /// multiplier (`tie_multiplier` for ties, 1 otherwise). Every other stake
    /// is lost.
    #[must_use]
    pub fn settle(&self, tie_multiplier: Points) -> Vec<Settlement> {
        let Some(outcome) = self.outcome else {
            return Vec::new();
        };

        self.bets
            .iter()
            .map(|(participant, bets)| {
                let net = bets
                    .stakes
                    .iter()
                    .map(|(class, amount)| {
                        if *class != outcome.winner {
                            -amount
                        } else if *class == BetClass::Tie {
                            amount * tie_multiplier
                        } else {
                            *amount
                        }
                    })
                    .sum();
                Settlement {
                    participant: *participant,
                    display_name: bets.display_name.clone(),
                    staked: bets.total(),
                    net,
                }
            })
            .collect()
    }
}

/// Archived copy of a finished round.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameRecord {
    pub game: Game,
    pub settlements: Vec<Settlement>,
    pub archived_at: DateTime<Utc>,
}
