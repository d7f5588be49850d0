//! Room configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    effects::QueueConfig,
    game::{BetLimits, Points, entities::MAX_DRAWS_PER_SIDE},
    scheduler::SchedulerConfig,
};

/// Longest accepted betting window
pub const MAX_BETTING_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Tuning shared by every room actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Time from round start to the betting deadline (default: 30s)
    pub betting_window: Duration,

    /// Reminders sent this long before the deadline (default: 20s, 10s, 5s)
    pub countdown_offsets: Vec<Duration>,

    /// Pause between a result and the next round in auto mode (default: 10s)
    pub auto_next_delay: Duration,

    /// Time a finished round stays visible before it is deleted (default: 60s)
    pub cleanup_delay: Duration,

    /// How late an interrupted betting phase may be resumed (default: 10s)
    pub recovery_grace: Duration,

    /// Upper bound on close-to-result before a round counts as stuck (default: 900s)
    ///
    /// Must cover a full deal that ends on fallbacks, see
    /// [`GameConfig::min_watchdog_timeout`].
    pub watchdog_timeout: Duration,

    /// Stake ceilings
    pub limits: BetLimits,

    /// Payout multiplier on a winning tie stake (default: 8)
    pub tie_multiplier: Points,

    /// Room actor inbox capacity
    pub inbox_capacity: usize,

    pub queue: QueueConfig,

    pub scheduler: SchedulerConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            betting_window: Duration::from_secs(30),
            countdown_offsets: vec![
                Duration::from_secs(20),
                Duration::from_secs(10),
                Duration::from_secs(5),
            ],
            auto_next_delay: Duration::from_secs(10),
            cleanup_delay: Duration::from_secs(60),
            recovery_grace: Duration::from_secs(10),
            watchdog_timeout: Duration::from_secs(900),
            limits: BetLimits {
                max_per_class: 10_000,
                max_total: 25_000,
            },
            tie_multiplier: 8,
            inbox_capacity: 100,
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl GameConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Describes the first inconsistent setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.betting_window.is_zero() || self.betting_window > MAX_BETTING_WINDOW {
            return Err("Betting window must be between 1s and 24h".to_string());
        }

        if self.limits.max_per_class <= 0 {
            return Err("Per-class bet ceiling must be positive".to_string());
        }

        if self.limits.max_total < self.limits.max_per_class {
            return Err("Aggregate bet ceiling must not be below the per-class ceiling".to_string());
        }

        if self.tie_multiplier < 1 {
            return Err("Tie multiplier must be at least 1".to_string());
        }

        if self.inbox_capacity == 0 {
            return Err("Inbox capacity must be positive".to_string());
        }

        let min_watchdog = self.min_watchdog_timeout();
        if self.watchdog_timeout < min_watchdog {
            return Err(format!(
                "Watchdog timeout must be at least {}s to deal a round on fallbacks",
                min_watchdog.as_secs_f64().ceil()
            ));
        }

        Ok(())
    }

    /// Worst case for a deal whose every channel call times out.
    ///
    /// Each of the six draws costs its announcement, the roll, the reveal
    /// delay and the reveal itself. One more notification covers the
    /// natural or result line.
    #[must_use]
    pub fn min_watchdog_timeout(&self) -> Duration {
        let queue = &self.queue;
        let notify = queue.min_gap.saturating_add(queue.blocking_timeout);
        let draw = queue
            .min_gap
            .saturating_add(queue.draw_timeout)
            .saturating_add(queue.reveal_delay)
            .saturating_add(queue.blocking_timeout);
        let draws = u32::try_from(2 * MAX_DRAWS_PER_SIDE).unwrap_or(u32::MAX);

        notify
            .saturating_add(draw)
            .saturating_mul(draws)
            .saturating_add(notify)
    }

    /// Betting window as a calendar duration, for deadlines.
    #[must_use]
    pub fn betting_window_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.betting_window.min(MAX_BETTING_WINDOW))
            .unwrap_or_else(|_| chrono::Duration::seconds(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tie_multiplier, 8);
        assert_eq!(config.betting_window_delta(), chrono::Duration::seconds(30));
    }

    #[test]
    fn test_rejects_aggregate_below_class_ceiling() {
        let config = GameConfig {
            limits: BetLimits {
                max_per_class: 500,
                max_total: 100,
            },
            ..GameConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("Aggregate"));
    }

    #[test]
    fn test_default_watchdog_outlasts_fallback_deal() {
        let config = GameConfig::default();
        let six_draw_timeouts = config.queue.draw_timeout * 6;
        assert!(config.min_watchdog_timeout() > six_draw_timeouts);
        assert!(config.watchdog_timeout >= config.min_watchdog_timeout());
    }

    #[test]
    fn test_rejects_watchdog_shorter_than_fallback_deal() {
        let config = GameConfig {
            watchdog_timeout: Duration::from_secs(120),
            ..GameConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("Watchdog"));
    }

    #[test]
    fn test_watchdog_floor_follows_queue_timing() {
        let config = GameConfig {
            queue: QueueConfig {
                draw_timeout: Duration::from_secs(5),
                reveal_delay: Duration::from_secs(1),
                min_gap: Duration::from_secs(1),
                blocking_timeout: Duration::from_secs(2),
                ..QueueConfig::default()
            },
            watchdog_timeout: Duration::from_secs(90),
            ..GameConfig::default()
        };
        // six times (1 + 2) + (1 + 5 + 1 + 2), then one more notify
        assert_eq!(config.min_watchdog_timeout(), Duration::from_secs(75));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = GameConfig {
            betting_window: Duration::ZERO,
            ..GameConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
