//! Errors surfaced to callers of the game control surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::{BetClass, Points};

/// Broad category of a [`GameError`], used by outer layers to pick a status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad request parameters. The round is unaffected.
    Validation,
    /// The operation is not valid for the current phase. Nothing changed.
    StateConflict,
    /// Persistence or actor failure.
    Internal,
}

/// Errors returned by game operations.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("unknown bet class '{0}', expected banker, player or tie")]
    InvalidBetClass(String),
    #[error("bet amount must be positive, got {0}")]
    InvalidAmount(Points),
    #[error("{class} stake would exceed {limit} by {overflow} (current {current})")]
    ClassLimitExceeded {
        class: BetClass,
        current: Points,
        limit: Points,
        overflow: Points,
    },
    #[error("total stake would exceed {limit} by {overflow} (current {current})")]
    TotalLimitExceeded {
        current: Points,
        limit: Points,
        overflow: Points,
    },
    #[error("a game is already in progress")]
    GameAlreadyInProgress,
    #[error("no game is running")]
    NoActiveGame,
    #[error("betting is closed")]
    BettingClosed,
    #[error("betting deadline has passed")]
    BettingDeadlinePassed,
    #[error("the round is already being processed")]
    AlreadyProcessing,
    #[error("store error: {0}")]
    Store(String),
    #[error("room is unavailable")]
    RoomUnavailable,
}

impl GameError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBetClass(_)
            | Self::InvalidAmount(_)
            | Self::ClassLimitExceeded { .. }
            | Self::TotalLimitExceeded { .. } => ErrorKind::Validation,
            Self::GameAlreadyInProgress
            | Self::NoActiveGame
            | Self::BettingClosed
            | Self::BettingDeadlinePassed
            | Self::AlreadyProcessing => ErrorKind::StateConflict,
            Self::Store(_) | Self::RoomUnavailable => ErrorKind::Internal,
        }
    }
}

impl From<crate::db::StoreError> for GameError {
    fn from(value: crate::db::StoreError) -> Self {
        Self::Store(value.to_string())
    }
}

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;
