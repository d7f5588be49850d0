//! Deciding what to do with a round found in the store at startup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::game::{Game, Phase};

/// Action the room actor takes for a persisted round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPlan {
    /// Nothing persisted.
    Idle,
    /// A close or deal is already running in this process.
    AlreadyProcessing,
    /// Deadline passed more than the grace period ago. Close now.
    CloseOverdue,
    /// Re-arm countdowns and auto-close against the original deadline.
    ResumeBetting,
    /// The process died mid-deal. The round cannot be completed.
    AbortDealing,
    /// Finished in auto mode. Schedule the next round.
    ResumeAutoNext,
    /// Finished without auto mode. Schedule deletion.
    ResumeCleanup,
}

/// Pick the recovery action for `game`.
#[must_use]
pub fn plan_recovery(
    game: Option<&Game>,
    auto_repeat: bool,
    now: DateTime<Utc>,
    grace: Duration,
) -> RecoveryPlan {
    let Some(game) = game else {
        return RecoveryPlan::Idle;
    };

    match game.phase {
        Phase::Betting => {
            let overdue = chrono::Duration::from_std(grace)
                .ok()
                .and_then(|grace| game.betting_deadline.checked_add_signed(grace))
                .is_some_and(|limit| now > limit);
            if overdue {
                RecoveryPlan::CloseOverdue
            } else {
                RecoveryPlan::ResumeBetting
            }
        }
        Phase::Dealing => RecoveryPlan::AbortDealing,
        Phase::Finished if auto_repeat => RecoveryPlan::ResumeAutoNext,
        Phase::Finished => RecoveryPlan::ResumeCleanup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(10);

    fn game_started_ago(secs: i64) -> (Game, DateTime<Utc>) {
        let now = Utc::now();
        let game = Game::new(
            1,
            chrono::Duration::seconds(30),
            now - chrono::Duration::seconds(secs),
        );
        (game, now)
    }

    #[test]
    fn test_nothing_stored_is_idle() {
        assert_eq!(
            plan_recovery(None, true, Utc::now(), GRACE),
            RecoveryPlan::Idle
        );
    }

    #[test]
    fn test_betting_inside_window_resumes() {
        let (game, now) = game_started_ago(5);
        assert_eq!(
            plan_recovery(Some(&game), false, now, GRACE),
            RecoveryPlan::ResumeBetting
        );
    }

    #[test]
    fn test_betting_within_grace_resumes() {
        // Deadline passed 5s ago, grace is 10s
        let (game, now) = game_started_ago(35);
        assert_eq!(
            plan_recovery(Some(&game), false, now, GRACE),
            RecoveryPlan::ResumeBetting
        );
    }

    #[test]
    fn test_betting_past_grace_closes() {
        let (game, now) = game_started_ago(45);
        assert_eq!(
            plan_recovery(Some(&game), false, now, GRACE),
            RecoveryPlan::CloseOverdue
        );
    }

    #[test]
    fn test_dealing_is_aborted() {
        let (mut game, now) = game_started_ago(40);
        game.phase = Phase::Dealing;
        assert_eq!(
            plan_recovery(Some(&game), true, now, GRACE),
            RecoveryPlan::AbortDealing
        );
    }

    #[test]
    fn test_finished_depends_on_auto_repeat() {
        let (mut game, now) = game_started_ago(90);
        game.phase = Phase::Finished;
        assert_eq!(
            plan_recovery(Some(&game), true, now, GRACE),
            RecoveryPlan::ResumeAutoNext
        );
        assert_eq!(
            plan_recovery(Some(&game), false, now, GRACE),
            RecoveryPlan::ResumeCleanup
        );
    }
}
