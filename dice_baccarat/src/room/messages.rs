//! Room actor message types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

use super::recovery::RecoveryPlan;
use crate::{
    effects::QueueError,
    game::{
        BetClass, Draws, GameResult, Outcome, ParticipantBets, ParticipantId, Phase, Points,
        RoomId, RoundId,
    },
};

/// Messages that can be sent to a RoomActor
#[derive(Debug)]
pub enum RoomMessage {
    StartGame {
        response: oneshot::Sender<GameResult<RoundId>>,
    },

    /// Bet class arrives unparsed so an unknown class is reported like any
    /// other validation failure.
    PlaceBet {
        participant: ParticipantId,
        display_name: String,
        class: String,
        amount: Points,
        response: oneshot::Sender<GameResult<BetReceipt>>,
    },

    CloseBetting {
        response: oneshot::Sender<GameResult<()>>,
    },

    /// Stop whatever is running. Responds with whether a round existed.
    ForceStop {
        response: oneshot::Sender<GameResult<bool>>,
    },

    /// Responds with the round started by enabling, if any.
    SetAutoRepeat {
        enabled: bool,
        response: oneshot::Sender<GameResult<Option<RoundId>>>,
    },

    GetStatus {
        response: oneshot::Sender<RoomStatus>,
    },

    /// Re-run startup recovery against the persisted state.
    Recover {
        response: oneshot::Sender<GameResult<RecoveryPlan>>,
    },

    /// Internal: a scheduled task fired. An error makes the scheduler retry.
    Timer {
        event: TimerEvent,
        response: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Internal: the deal task for `round_id` ended.
    DealFinished {
        round_id: RoundId,
        result: Result<Draws, QueueError>,
    },

    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Scheduled callbacks, each tied to the round it was scheduled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Countdown { round_id: RoundId, seconds_left: u64 },
    AutoClose { round_id: RoundId },
    AutoNext { round_id: RoundId },
    Cleanup { round_id: RoundId },
    Watchdog { round_id: RoundId },
}

impl TimerEvent {
    pub fn round_id(&self) -> &RoundId {
        match self {
            Self::Countdown { round_id, .. }
            | Self::AutoClose { round_id }
            | Self::AutoNext { round_id }
            | Self::Cleanup { round_id }
            | Self::Watchdog { round_id } => round_id,
        }
    }
}

/// Accepted bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BetReceipt {
    pub round_id: RoundId,
    pub class: BetClass,
    pub amount: Points,
    /// Participant's stake on `class` after this bet
    pub class_stake: Points,
    /// Participant's stake over all classes after this bet
    pub total_stake: Points,
}

/// Room state snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: RoomId,

    /// `None` when the room is idle
    pub phase: Option<Phase>,

    pub round_id: Option<RoundId>,

    pub betting_deadline: Option<DateTime<Utc>>,

    /// Whole seconds until the deadline, zero once it passed
    pub seconds_remaining: Option<i64>,

    pub bets: BTreeMap<ParticipantId, ParticipantBets>,

    pub draws: Option<Draws>,

    pub outcome: Option<Outcome>,

    pub auto_repeat: bool,

    /// A close or deal is in flight
    pub processing: bool,

    /// Effects queued or in flight
    pub pending_effects: usize,

    pub scheduled_tasks: usize,
}
