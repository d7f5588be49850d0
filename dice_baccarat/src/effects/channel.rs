//! Outbound chat channel abstraction.
//!
//! The queue is the only caller of an [`OutboundChannel`]. Implementations
//! report failures as [`ChannelError`] so the queue can decide whether a retry
//! makes sense.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::game::{DieValue, RoomId};

/// Delivery failures reported by a channel
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ChannelError {
    /// The remote side asked us to slow down
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Remote server failure (5xx)
    #[error("server error {0}")]
    Server(u16),

    /// Transport failure before any response
    #[error("network error: {0}")]
    Network(String),

    /// The request itself was refused. Retrying cannot help.
    #[error("rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },
}

impl ChannelError {
    /// Rate limits, server errors and network errors are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Minimum wait the remote side asked for, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// External chat transport.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Send a text message to a room.
    async fn notify(&self, destination: RoomId, text: &str) -> ChannelResult<()>;

    /// Roll a die in a room and report its face. Implementations return the
    /// raw value they observed; range checking happens in the queue.
    async fn draw(&self, destination: RoomId) -> ChannelResult<DieValue>;
}

/// Development channel that writes narration to the log and rolls locally.
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl OutboundChannel for LogChannel {
    async fn notify(&self, destination: RoomId, text: &str) -> ChannelResult<()> {
        log::info!("Room {}: {}", destination, text);
        Ok(())
    }

    async fn draw(&self, destination: RoomId) -> ChannelResult<DieValue> {
        let value = rand::random_range(1..=6);
        log::info!("Room {}: rolled {}", destination, value);
        Ok(value)
    }
}

/// Scripted channel for tests.
pub mod testing {
    use super::*;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    /// One recorded call on a [`MockChannel`].
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum Delivery {
        Notify { destination: RoomId, text: String },
        Draw { destination: RoomId, value: DieValue },
    }

    #[derive(Default)]
    struct Script {
        deliveries: Vec<Delivery>,
        attempts: usize,
        notify_failures: VecDeque<ChannelError>,
        draw_failures: VecDeque<ChannelError>,
        draw_values: VecDeque<DieValue>,
        latency: Option<Duration>,
        draw_latency: Option<Duration>,
    }

    /// Records every successful delivery and replays scripted failures and
    /// draw values. Unscripted draws return 1.
    #[derive(Clone, Default)]
    pub struct MockChannel {
        script: Arc<Mutex<Script>>,
    }

    impl MockChannel {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Draw values handed out in order.
        #[must_use]
        pub fn with_draws(self, values: impl IntoIterator<Item = DieValue>) -> Self {
            self.script().draw_values.extend(values);
            self
        }

        /// Fail the next notify attempts with these errors, in order.
        pub fn fail_notifies(&self, errors: impl IntoIterator<Item = ChannelError>) {
            self.script().notify_failures.extend(errors);
        }

        /// Fail the next draw attempts with these errors, in order.
        pub fn fail_draws(&self, errors: impl IntoIterator<Item = ChannelError>) {
            self.script().draw_failures.extend(errors);
        }

        /// Delay every call by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            self.script().latency = Some(latency);
        }

        /// Delay only draws by `latency`, on top of any call latency.
        pub fn set_draw_latency(&self, latency: Duration) {
            self.script().draw_latency = Some(latency);
        }

        #[must_use]
        pub fn deliveries(&self) -> Vec<Delivery> {
            self.script().deliveries.clone()
        }

        /// Texts of delivered notifications, in delivery order.
        #[must_use]
        pub fn texts(&self) -> Vec<String> {
            self.script()
                .deliveries
                .iter()
                .filter_map(|d| match d {
                    Delivery::Notify { text, .. } => Some(text.clone()),
                    Delivery::Draw { .. } => None,
                })
                .collect()
        }

        /// Values of delivered draws, in delivery order.
        #[must_use]
        pub fn drawn(&self) -> Vec<DieValue> {
            self.script()
                .deliveries
                .iter()
                .filter_map(|d| match d {
                    Delivery::Draw { value, .. } => Some(*value),
                    Delivery::Notify { .. } => None,
                })
                .collect()
        }

        /// Number of calls made, successful or not.
        #[must_use]
        pub fn attempts(&self) -> usize {
            self.script().attempts
        }

        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(|e| e.into_inner())
        }

        async fn pause(&self) {
            let latency = self.script().latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
        }
    }

    #[async_trait]
    impl OutboundChannel for MockChannel {
        async fn notify(&self, destination: RoomId, text: &str) -> ChannelResult<()> {
            self.pause().await;
            let mut script = self.script();
            script.attempts += 1;
            if let Some(err) = script.notify_failures.pop_front() {
                return Err(err);
            }
            script.deliveries.push(Delivery::Notify {
                destination,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn draw(&self, destination: RoomId) -> ChannelResult<DieValue> {
            self.pause().await;
            let draw_latency = self.script().draw_latency;
            if let Some(latency) = draw_latency {
                tokio::time::sleep(latency).await;
            }
            let mut script = self.script();
            script.attempts += 1;
            if let Some(err) = script.draw_failures.pop_front() {
                return Err(err);
            }
            let value = script.draw_values.pop_front().unwrap_or(1);
            script
                .deliveries
                .push(Delivery::Draw { destination, value });
            Ok(value)
        }
    }
}
