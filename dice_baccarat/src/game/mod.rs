//! Dice baccarat round model.
//!
//! - [`rules`]: point totals and third-draw tables
//! - [`entities`]: the round aggregate and its value types
//! - [`errors`]: errors surfaced to callers

pub mod entities;
pub mod errors;
pub mod rules;

pub use entities::{
    BetClass, BetLimits, DieValue, Draws, Game, GameRecord, Outcome, ParticipantBets,
    ParticipantId, Phase, Points, RoomId, RoundId, Settlement, Side,
};
pub use errors::{ErrorKind, GameError, GameResult};
