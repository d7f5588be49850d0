//! Strictly ordered outbound effect queue.
//!
//! Every notification and dice draw for a room goes through one
//! [`EffectQueue`]. A single [`QueueWorker`] drains it by ascending sequence
//! number with at most one effect in flight, so the chat sees effects exactly
//! in the order they were enqueued, retries included.
//!
//! Blocking callers are handed a `oneshot` receiver that the worker resolves
//! once their effect completes. [`EffectQueue::clear`] resolves all of them
//! with [`QueueError::Cancelled`].
//!
//! Die values only ever come from the worker, and the worker announces every
//! value it hands out, fallbacks included. Every channel call it makes is
//! time-bounded, so a draw always resolves.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    sync::{Notify, oneshot},
    time::{Instant, sleep, sleep_until, timeout},
};

use super::channel::{ChannelError, OutboundChannel};
use crate::{
    game::{DieValue, RoomId, RoundId, Side, entities::DIE_FACES},
    metrics, narration,
};

/// Position of an effect in its game's delivery order.
pub type SequenceId = u64;

/// Queue tuning.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct QueueConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Backoff before the first retry. Doubles per retry.
    pub base_backoff: Duration,
    /// Upper bound on a single backoff.
    pub max_backoff: Duration,
    /// Minimum spacing between two consecutive deliveries.
    pub min_gap: Duration,
    /// Time the die animation needs before its value is announced.
    pub reveal_delay: Duration,
    /// Upper bound on delivering one notification, retries included. Also
    /// bounds a blocking notify wait.
    pub blocking_timeout: Duration,
    /// Upper bound on rolling one die, retries included. A roll that takes
    /// longer is replaced by a fallback.
    pub draw_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            min_gap: Duration::from_millis(1000),
            reveal_delay: Duration::from_secs(4),
            blocking_timeout: Duration::from_secs(30),
            draw_timeout: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// What an effect does once it reaches the front of the queue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EffectKind {
    Notify { text: String },
    /// Roll for draw `index` (1-based) of `side`.
    Draw { side: Side, index: u8 },
}

/// How a completed effect ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EffectOutcome {
    Delivered,
    Drawn { value: DieValue, fallback: bool },
}

/// Errors handed to callers waiting on an effect.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum QueueError {
    #[error("effect {0} was cancelled")]
    Cancelled(SequenceId),
    #[error("effect {0} was dropped after {1} attempts")]
    Dropped(SequenceId, u32),
    #[error("timed out waiting for effect {0}")]
    Timeout(SequenceId),
    #[error("effect queue is shut down")]
    Closed,
}

type Completion = oneshot::Sender<Result<EffectOutcome, QueueError>>;

/// An effect waiting for delivery.
#[derive(Debug)]
pub struct QueuedEffect {
    pub sequence_id: SequenceId,
    pub destination: RoomId,
    pub kind: EffectKind,
    pub blocking: bool,
    completion: Option<Completion>,
}

struct InFlight {
    sequence_id: SequenceId,
    epoch: u64,
    completion: Option<Completion>,
}

#[derive(Default)]
struct QueueState {
    active_game: Option<RoundId>,
    next_sequence: SequenceId,
    pending: BTreeMap<SequenceId, QueuedEffect>,
    in_flight: Option<InFlight>,
    /// Bumped on every clear. Work started under an older epoch is stale.
    epoch: u64,
    closed: bool,
}

impl QueueState {
    /// Releases every waiting caller and forgets all queued work.
    fn release_all(&mut self) -> usize {
        self.epoch += 1;
        let mut released = 0;

        for (seq, effect) in std::mem::take(&mut self.pending) {
            if let Some(completion) = effect.completion {
                let _ = completion.send(Err(QueueError::Cancelled(seq)));
            }
            released += 1;
        }

        if let Some(in_flight) = self.in_flight.take() {
            if let Some(completion) = in_flight.completion {
                let _ = completion.send(Err(QueueError::Cancelled(in_flight.sequence_id)));
            }
            released += 1;
        }

        released
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Wakes the worker when work arrives.
    wake: Notify,
    /// Interrupts the in-flight effect on clear.
    cancelled: Notify,
    config: QueueConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle for enqueueing effects. Cheap to clone.
#[derive(Clone)]
pub struct EffectQueue {
    shared: Arc<Shared>,
}

impl EffectQueue {
    /// Create a queue and the worker that drains it.
    ///
    /// The worker must be spawned (`tokio::spawn(worker.run())`) for anything
    /// to be delivered.
    pub fn new(channel: Arc<dyn OutboundChannel>, config: QueueConfig) -> (Self, QueueWorker) {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            cancelled: Notify::new(),
            config,
        });

        let queue = Self {
            shared: shared.clone(),
        };
        let worker = QueueWorker { shared, channel };

        (queue, worker)
    }

    /// Start sequencing effects for a new game.
    ///
    /// Resets the sequence counter to zero. Anything still queued for an
    /// earlier game is released as cancelled.
    pub fn set_active_game(&self, round_id: RoundId) {
        let released = {
            let mut state = self.shared.lock();
            let released = state.release_all();
            state.active_game = Some(round_id.clone());
            state.next_sequence = 0;
            released
        };
        if released > 0 {
            self.shared.cancelled.notify_waiters();
            log::debug!(
                "Released {} stale effects before round {}",
                released,
                round_id
            );
        }
    }

    /// Game whose effects are currently being sequenced.
    #[must_use]
    pub fn active_game(&self) -> Option<RoundId> {
        self.shared.lock().active_game.clone()
    }

    /// Append a notification.
    ///
    /// With `blocking` the call waits until the notification was delivered or
    /// gave up, bounded by the configured blocking timeout.
    ///
    /// # Errors
    ///
    /// Non-blocking calls only fail when the queue is shut down. Blocking calls
    /// also report dropped, cancelled and timed-out effects.
    pub async fn enqueue_notify(
        &self,
        destination: RoomId,
        content: impl Into<String>,
        blocking: bool,
    ) -> Result<SequenceId, QueueError> {
        let kind = EffectKind::Notify {
            text: content.into(),
        };

        if !blocking {
            return self.push(destination, kind, None);
        }

        let (tx, rx) = oneshot::channel();
        let seq = self.push(destination, kind, Some(tx))?;

        match timeout(self.shared.config.blocking_timeout, rx).await {
            Ok(Ok(Ok(_))) => Ok(seq),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(QueueError::Cancelled(seq)),
            Err(_) => {
                log::warn!("Blocking notify {} timed out", seq);
                self.discard(seq);
                Err(QueueError::Timeout(seq))
            }
        }
    }

    /// Roll draw `index` of `side` and wait for its value.
    ///
    /// Always resolves with a value in 1..=6 unless the queue was cleared: a
    /// failed, invalid or late roll is replaced by a locally generated
    /// fallback. The value returned is the value revealed in the chat.
    ///
    /// # Errors
    ///
    /// [`QueueError::Cancelled`] when the queue is cleared while waiting and
    /// [`QueueError::Closed`] after shutdown.
    pub async fn enqueue_draw(
        &self,
        destination: RoomId,
        side: Side,
        index: u8,
    ) -> Result<DieValue, QueueError> {
        let (tx, rx) = oneshot::channel();
        let seq = self.push(destination, EffectKind::Draw { side, index }, Some(tx))?;

        match rx.await {
            Ok(Ok(EffectOutcome::Drawn { value, .. })) => Ok(value),
            // Draw effects always complete as Drawn.
            Ok(Ok(EffectOutcome::Delivered)) => Err(QueueError::Dropped(seq, 0)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(QueueError::Cancelled(seq)),
        }
    }

    /// Drop all pending effects and release every waiting caller.
    ///
    /// Idempotent. Returns how many effects were released.
    pub fn clear(&self) -> usize {
        let released = self.shared.lock().release_all();
        self.shared.cancelled.notify_waiters();
        if released > 0 {
            log::debug!("Cleared {} effects", released);
        }
        released
    }

    /// Number of effects queued or in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.shared.lock();
        state.pending.len() + usize::from(state.in_flight.is_some())
    }

    /// Stop the worker after releasing everything still queued.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.release_all();
            state.closed = true;
        }
        self.shared.cancelled.notify_waiters();
        self.shared.wake.notify_one();
    }

    fn push(
        &self,
        destination: RoomId,
        kind: EffectKind,
        completion: Option<Completion>,
    ) -> Result<SequenceId, QueueError> {
        let seq = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let seq = state.next_sequence;
            state.next_sequence += 1;
            state.pending.insert(
                seq,
                QueuedEffect {
                    sequence_id: seq,
                    destination,
                    blocking: completion.is_some(),
                    kind,
                    completion,
                },
            );
            seq
        };
        self.shared.wake.notify_one();
        Ok(seq)
    }

    /// Remove an effect that nobody waits for anymore, if it has not started.
    fn discard(&self, seq: SequenceId) {
        self.shared.lock().pending.remove(&seq);
    }
}

struct Job {
    sequence_id: SequenceId,
    destination: RoomId,
    kind: EffectKind,
    epoch: u64,
}

/// Drain loop of an [`EffectQueue`].
pub struct QueueWorker {
    shared: Arc<Shared>,
    channel: Arc<dyn OutboundChannel>,
}

impl QueueWorker {
    /// Deliver effects until the queue is shut down.
    pub async fn run(self) {
        let mut last_delivery: Option<Instant> = None;

        loop {
            let job = {
                let mut state = self.shared.lock();
                if state.closed {
                    break;
                }
                Self::take_next(&mut state)
            };

            let Some(job) = job else {
                self.shared.wake.notified().await;
                continue;
            };

            let cancelled = self.shared.cancelled.notified();
            tokio::pin!(cancelled);
            cancelled.as_mut().enable();

            // A clear may have landed between taking the job and arming the
            // cancellation signal.
            if self.shared.lock().epoch != job.epoch {
                continue;
            }

            if let Some(last) = last_delivery {
                sleep_until(last + self.shared.config.min_gap).await;
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut cancelled => None,
                outcome = self.execute(&job) => Some(outcome),
            };
            last_delivery = Some(Instant::now());

            let Some(outcome) = outcome else {
                log::debug!("Effect {} interrupted by clear", job.sequence_id);
                continue;
            };

            let mut state = self.shared.lock();
            let current = state
                .in_flight
                .as_ref()
                .is_some_and(|f| f.sequence_id == job.sequence_id && f.epoch == job.epoch);
            if current
                && let Some(in_flight) = state.in_flight.take()
                && let Some(completion) = in_flight.completion
            {
                let _ = completion.send(outcome);
            }
        }

        log::debug!("Effect queue worker stopped");
    }

    fn take_next(state: &mut QueueState) -> Option<Job> {
        let (seq, mut effect) = state.pending.pop_first()?;
        state.in_flight = Some(InFlight {
            sequence_id: seq,
            epoch: state.epoch,
            completion: effect.completion.take(),
        });
        Some(Job {
            sequence_id: seq,
            destination: effect.destination,
            kind: effect.kind,
            epoch: state.epoch,
        })
    }

    async fn execute(&self, job: &Job) -> Result<EffectOutcome, QueueError> {
        match &job.kind {
            EffectKind::Notify { text } => {
                match self.deliver(job.destination, text).await {
                    Ok(()) => {
                        metrics::effect_delivered("notify");
                        Ok(EffectOutcome::Delivered)
                    }
                    Err((err, attempts)) => {
                        log::error!(
                            "Room {}: dropping notify {} after {} attempts: {}",
                            job.destination,
                            job.sequence_id,
                            attempts,
                            err
                        );
                        metrics::effect_dropped("notify");
                        Err(QueueError::Dropped(job.sequence_id, attempts))
                    }
                }
            }
            EffectKind::Draw { side, index } => {
                let (value, fallback) = self.roll(job).await;
                sleep(self.shared.config.reveal_delay).await;

                let text = narration::draw_revealed(*side, *index, value, fallback);
                if let Err((err, attempts)) = self.deliver(job.destination, &text).await {
                    log::warn!(
                        "Room {}: reveal for draw {} lost after {} attempts: {}",
                        job.destination,
                        job.sequence_id,
                        attempts,
                        err
                    );
                }
                metrics::effect_delivered("draw");
                Ok(EffectOutcome::Drawn { value, fallback })
            }
        }
    }

    async fn roll(&self, job: &Job) -> (DieValue, bool) {
        let mut attempts = 0;
        let rolled = timeout(
            self.shared.config.draw_timeout,
            self.draw_with_retries(job, &mut attempts),
        )
        .await;

        let reason = match rolled {
            Ok(Ok(value)) if DIE_FACES.contains(&value) => return (value, false),
            Ok(Ok(value)) => format!("returned {value}"),
            Ok(Err(err)) => format!("failed after {attempts} attempts ({err})"),
            Err(_) => format!("got no value within {:?}", self.shared.config.draw_timeout),
        };

        let fallback = fallback_value();
        log::warn!(
            "Room {}: draw {} {}, using fallback {}",
            job.destination,
            job.sequence_id,
            reason,
            fallback
        );
        metrics::draw_fallback();
        (fallback, true)
    }

    async fn draw_with_retries(
        &self,
        job: &Job,
        attempts: &mut u32,
    ) -> Result<DieValue, ChannelError> {
        loop {
            *attempts += 1;
            match self.channel.draw(job.destination).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && *attempts <= self.shared.config.max_retries => {
                    let wait = self.retry_wait(&err, *attempts);
                    log::warn!(
                        "Room {}: draw {} failed ({}), retry {} in {:?}",
                        job.destination,
                        job.sequence_id,
                        err,
                        attempts,
                        wait
                    );
                    metrics::effect_retried();
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver `text` with retries, bounded by the blocking timeout.
    async fn deliver(
        &self,
        destination: RoomId,
        text: &str,
    ) -> Result<(), (ChannelError, u32)> {
        let bound = self.shared.config.blocking_timeout;
        let mut attempts = 0;

        match timeout(bound, self.notify_with_retries(destination, text, &mut attempts)).await {
            Ok(result) => result.map_err(|err| (err, attempts)),
            Err(_) => Err((
                ChannelError::Network(format!("no response within {bound:?}")),
                attempts,
            )),
        }
    }

    async fn notify_with_retries(
        &self,
        destination: RoomId,
        text: &str,
        attempts: &mut u32,
    ) -> Result<(), ChannelError> {
        loop {
            *attempts += 1;
            match self.channel.notify(destination, text).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && *attempts <= self.shared.config.max_retries => {
                    let wait = self.retry_wait(&err, *attempts);
                    log::warn!(
                        "Room {}: notify failed ({}), retry {} in {:?}",
                        destination,
                        err,
                        attempts,
                        wait
                    );
                    metrics::effect_retried();
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn retry_wait(&self, err: &ChannelError, retry: u32) -> Duration {
        let backoff = self.shared.config.backoff(retry);
        err.retry_after().map_or(backoff, |hint| hint.max(backoff))
    }
}

/// Locally generated die face used when the channel cannot provide one.
#[must_use]
pub fn fallback_value() -> DieValue {
    rand::random_range(DIE_FACES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::channel::testing::{Delivery, MockChannel};

    fn fast_config() -> QueueConfig {
        QueueConfig {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            min_gap: Duration::from_millis(50),
            reveal_delay: Duration::from_millis(200),
            blocking_timeout: Duration::from_secs(30),
            draw_timeout: Duration::from_secs(60),
        }
    }

    fn start(channel: &MockChannel, config: QueueConfig) -> EffectQueue {
        let (queue, worker) = EffectQueue::new(Arc::new(channel.clone()), config);
        tokio::spawn(worker.run());
        queue.set_active_game(RoundId::from("round-1"));
        queue
    }

    // === Config Tests ===

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = fast_config();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(10), Duration::from_secs(1));
    }

    // === Ordering Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_sequence_ids_restart_per_game() {
        let channel = MockChannel::new();
        let queue = start(&channel, fast_config());

        assert_eq!(queue.enqueue_notify(1, "a", false).await.unwrap(), 0);
        assert_eq!(queue.enqueue_notify(1, "b", false).await.unwrap(), 1);

        queue.set_active_game(RoundId::from("round-2"));
        assert_eq!(queue.enqueue_notify(1, "c", false).await.unwrap(), 0);
        assert_eq!(queue.active_game(), Some(RoundId::from("round-2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_enqueue_order_despite_retries() {
        let channel = MockChannel::new();
        channel.fail_notifies([
            ChannelError::Server(502),
            ChannelError::RateLimited {
                retry_after: Some(Duration::from_millis(300)),
            },
        ]);
        let queue = start(&channel, fast_config());

        for i in 0..5 {
            queue
                .enqueue_notify(7, format!("message {i}"), false)
                .await
                .unwrap();
        }
        queue.enqueue_notify(7, "last", true).await.unwrap();

        assert_eq!(
            channel.texts(),
            vec![
                "message 0",
                "message 1",
                "message 2",
                "message 3",
                "message 4",
                "last"
            ]
        );
        assert_eq!(channel.attempts(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_dropped_after_retries_does_not_stall_queue() {
        let channel = MockChannel::new();
        channel.fail_notifies(vec![ChannelError::Server(500); 4]);
        let queue = start(&channel, fast_config());

        let result = queue.enqueue_notify(7, "doomed", true).await;
        assert_eq!(result, Err(QueueError::Dropped(0, 4)));

        queue.enqueue_notify(7, "next", true).await.unwrap();
        assert_eq!(channel.texts(), vec!["next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let channel = MockChannel::new();
        channel.fail_notifies([ChannelError::Rejected {
            status: 403,
            reason: "bot was kicked".into(),
        }]);
        let queue = start(&channel, fast_config());

        let result = queue.enqueue_notify(7, "hello", true).await;
        assert_eq!(result, Err(QueueError::Dropped(0, 1)));
        assert_eq!(channel.attempts(), 1);
    }

    // === Draw Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_draw_reveals_value_after_roll() {
        let channel = MockChannel::new().with_draws([5]);
        let queue = start(&channel, fast_config());

        let value = queue.enqueue_draw(9, Side::A, 1).await.unwrap();
        assert_eq!(value, 5);

        let deliveries = channel.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(
            deliveries[0],
            Delivery::Draw {
                destination: 9,
                value: 5
            }
        );
        assert!(matches!(&deliveries[1], Delivery::Notify { text, .. } if text.contains('5')));
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_falls_back_when_channel_fails() {
        let channel = MockChannel::new();
        channel.fail_draws(vec![ChannelError::Network("timeout".into()); 4]);
        let queue = start(&channel, fast_config());

        let value = queue.enqueue_draw(9, Side::B, 2).await.unwrap();
        assert!((1..=6).contains(&value));
        assert!(channel.drawn().is_empty());
        assert_eq!(channel.texts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_replaces_out_of_range_value() {
        let channel = MockChannel::new().with_draws([9]);
        let queue = start(&channel, fast_config());

        let value = queue.enqueue_draw(9, Side::A, 1).await.unwrap();
        assert!((1..=6).contains(&value));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_roll_is_replaced_by_announced_fallback() {
        let channel = MockChannel::new().with_draws([3, 3, 3, 3]);
        channel.set_draw_latency(Duration::from_secs(70));
        let queue = start(&channel, fast_config());

        let mut used = Vec::new();
        for index in 1..=4 {
            used.push(queue.enqueue_draw(9, Side::A, index).await.unwrap());
        }

        // Late rolls never complete and never reach the chat
        assert!(channel.drawn().is_empty());
        let expected: Vec<String> = used
            .iter()
            .zip(1u8..)
            .map(|(value, index)| narration::draw_revealed(Side::A, index, *value, true))
            .collect();
        assert_eq!(channel.texts(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_roll_inside_draw_timeout_is_used() {
        let channel = MockChannel::new().with_draws([3]);
        channel.set_draw_latency(Duration::from_secs(50));
        let queue = start(&channel, fast_config());

        assert_eq!(queue.enqueue_draw(9, Side::B, 1).await.unwrap(), 3);
        assert_eq!(
            channel.texts(),
            vec![narration::draw_revealed(Side::B, 1, 3, false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_notify_does_not_block_draws() {
        let channel = MockChannel::new().with_draws([4]);
        channel.set_latency(Duration::from_secs(3600));
        let queue = start(&channel, fast_config());

        queue.enqueue_notify(9, "stuck", false).await.unwrap();
        let value = tokio::time::timeout(
            Duration::from_secs(300),
            queue.enqueue_draw(9, Side::A, 1),
        )
        .await
        .expect("draw left suspended")
        .unwrap();

        assert!((1..=6).contains(&value));
        assert!(channel.drawn().is_empty());
        assert!(channel.texts().is_empty());
    }

    // === Clear Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_clear_releases_blocked_callers() {
        let channel = MockChannel::new();
        channel.set_latency(Duration::from_secs(5));
        let queue = start(&channel, fast_config());

        let mut waiters = Vec::new();
        for i in 0..3 {
            let q = queue.clone();
            waiters.push(tokio::spawn(async move {
                q.enqueue_notify(1, format!("n{i}"), true).await
            }));
        }
        let q = queue.clone();
        let draw = tokio::spawn(async move { q.enqueue_draw(1, Side::A, 1).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.pending(), 4);
        queue.clear();
        queue.clear();

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("caller left suspended")
                .unwrap();
            assert!(matches!(result, Err(QueueError::Cancelled(_))));
        }
        let result = tokio::time::timeout(Duration::from_secs(1), draw)
            .await
            .expect("draw left suspended")
            .unwrap();
        assert!(matches!(result, Err(QueueError::Cancelled(_))));
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_in_flight_notify_never_reaches_chat() {
        let channel = MockChannel::new();
        channel.set_latency(Duration::from_secs(5));
        let queue = start(&channel, fast_config());

        let q = queue.clone();
        let waiter = tokio::spawn(async move { q.enqueue_notify(1, "stale", true).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(queue.pending(), 1);

        queue.clear();
        assert_eq!(waiter.await.unwrap(), Err(QueueError::Cancelled(0)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(channel.texts().is_empty());
        assert_eq!(channel.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_keeps_working_after_clear() {
        let channel = MockChannel::new();
        let queue = start(&channel, fast_config());

        queue.clear();
        queue.enqueue_notify(1, "after", true).await.unwrap();
        assert_eq!(channel.texts(), vec!["after"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_effects() {
        let channel = MockChannel::new();
        let queue = start(&channel, fast_config());

        queue.shutdown();
        assert_eq!(
            queue.enqueue_notify(1, "late", false).await,
            Err(QueueError::Closed)
        );
    }
}
