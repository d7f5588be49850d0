//! Room actor: owns one room's round and drives it through its phases.

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use super::{
    config::GameConfig,
    dealer,
    messages::{BetReceipt, RoomMessage, RoomStatus, TimerEvent},
    recovery::{RecoveryPlan, plan_recovery},
};
use crate::{
    db::GameStore,
    effects::{EffectQueue, OutboundChannel, QueueError, QueueWorker},
    game::{
        BetClass, Draws, Game, GameError, GameRecord, GameResult, Outcome, ParticipantId, Phase,
        Points, RoomId, RoundId,
    },
    metrics, narration,
    scheduler::{Scheduler, TaskCategory, TaskId},
};

/// Room actor handle for sending messages
#[derive(Clone)]
pub struct RoomHandle {
    sender: mpsc::Sender<RoomMessage>,
    room_id: RoomId,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Whether the actor behind this handle has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn start_game(&self) -> GameResult<RoundId> {
        self.request(|response| RoomMessage::StartGame { response })
            .await?
    }

    pub async fn place_bet(
        &self,
        participant: ParticipantId,
        display_name: impl Into<String>,
        class: impl Into<String>,
        amount: Points,
    ) -> GameResult<BetReceipt> {
        let display_name = display_name.into();
        let class = class.into();
        self.request(|response| RoomMessage::PlaceBet {
            participant,
            display_name,
            class,
            amount,
            response,
        })
        .await?
    }

    pub async fn close_betting(&self) -> GameResult<()> {
        self.request(|response| RoomMessage::CloseBetting { response })
            .await?
    }

    pub async fn force_stop(&self) -> GameResult<bool> {
        self.request(|response| RoomMessage::ForceStop { response })
            .await?
    }

    pub async fn set_auto_repeat(&self, enabled: bool) -> GameResult<Option<RoundId>> {
        self.request(|response| RoomMessage::SetAutoRepeat { enabled, response })
            .await?
    }

    pub async fn status(&self) -> GameResult<RoomStatus> {
        self.request(|response| RoomMessage::GetStatus { response })
            .await
    }

    pub async fn recover(&self) -> GameResult<RecoveryPlan> {
        self.request(|response| RoomMessage::Recover { response })
            .await?
    }

    /// Stop the actor. Persisted state is kept for the next start.
    pub async fn shutdown(&self) -> GameResult<()> {
        self.request(|response| RoomMessage::Shutdown { response })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> GameResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| GameError::RoomUnavailable)?;
        rx.await.map_err(|_| GameError::RoomUnavailable)
    }
}

/// Actor owning the round of a single room
pub struct RoomActor {
    id: RoomId,

    config: Arc<GameConfig>,

    /// Current round, `None` when idle
    game: Option<Game>,

    auto_repeat: bool,

    /// Set from close until the deal result is applied
    processing: bool,

    deal_task: Option<JoinHandle<()>>,

    store: GameStore,

    queue: EffectQueue,

    /// Taken and spawned when the actor starts running
    worker: Option<QueueWorker>,

    scheduler: Scheduler,

    inbox: mpsc::Receiver<RoomMessage>,

    /// Lets timers and the deal task reach the inbox without keeping the
    /// actor alive
    sender: mpsc::WeakSender<RoomMessage>,

    is_closed: bool,
}

impl RoomActor {
    pub fn new(
        id: RoomId,
        config: Arc<GameConfig>,
        store: GameStore,
        channel: Arc<dyn OutboundChannel>,
    ) -> (Self, RoomHandle) {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity);
        let (queue, worker) = EffectQueue::new(channel, config.queue.clone());
        let scheduler = Scheduler::new(config.scheduler.clone());

        let actor = Self {
            id,
            config,
            game: None,
            auto_repeat: false,
            processing: false,
            deal_task: None,
            store,
            queue,
            worker: Some(worker),
            scheduler,
            inbox,
            sender: sender.downgrade(),
            is_closed: false,
        };

        let handle = RoomHandle {
            sender,
            room_id: id,
        };

        (actor, handle)
    }

    /// Run the room actor event loop
    ///
    /// Recovers persisted state first, then serves messages until shut down or
    /// until every handle is dropped.
    pub async fn run(mut self) {
        log::info!("Room {}: actor starting", self.id);

        let worker = self.worker.take().map(|w| tokio::spawn(w.run()));

        match self.recover().await {
            Ok(RecoveryPlan::Idle) => {}
            Ok(plan) => log::info!("Room {}: recovered with {:?}", self.id, plan),
            Err(e) => log::error!("Room {}: recovery failed: {}", self.id, e),
        }

        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message).await;
            if self.is_closed {
                break;
            }
        }

        self.scheduler.cancel_all(None, None);
        if let Some(task) = self.deal_task.take() {
            task.abort();
        }
        self.queue.shutdown();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        log::info!("Room {}: actor stopped", self.id);
    }

    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::StartGame { response } => {
                let result = self.start_game().await;
                let _ = response.send(result);
            }

            RoomMessage::PlaceBet {
                participant,
                display_name,
                class,
                amount,
                response,
            } => {
                let result = self
                    .place_bet(participant, display_name, &class, amount)
                    .await;
                if result.is_err() {
                    metrics::bet_rejected();
                }
                let _ = response.send(result);
            }

            RoomMessage::CloseBetting { response } => {
                let result = self.close_betting().await;
                let _ = response.send(result);
            }

            RoomMessage::ForceStop { response } => {
                let result = self.force_stop().await;
                let _ = response.send(result);
            }

            RoomMessage::SetAutoRepeat { enabled, response } => {
                let result = self.set_auto_repeat(enabled).await;
                let _ = response.send(result);
            }

            RoomMessage::GetStatus { response } => {
                let _ = response.send(self.status());
            }

            RoomMessage::Recover { response } => {
                let result = self.recover().await;
                let _ = response.send(result);
            }

            RoomMessage::Timer { event, response } => {
                let result = self.handle_timer(event).await;
                let _ = response.send(result);
            }

            RoomMessage::DealFinished { round_id, result } => {
                self.handle_deal_finished(round_id, result).await;
            }

            RoomMessage::Shutdown { response } => {
                self.is_closed = true;
                let _ = response.send(());
            }
        }
    }

    // === Operations ===

    async fn start_game(&mut self) -> GameResult<RoundId> {
        if self.game.as_ref().is_some_and(|g| !g.is_finished()) {
            return Err(GameError::GameAlreadyInProgress);
        }

        let now = Utc::now();
        let game = Game::new(self.id, self.config.betting_window_delta(), now);

        // Same key as the finished round, so this also removes it.
        self.store.save_game(&game).await?;

        self.scheduler.cancel_all(None, None);
        self.queue.clear();
        self.queue.set_active_game(game.round_id.clone());

        let round_id = game.round_id.clone();
        self.announce(narration::round_opened(&game, now)).await;
        self.schedule_betting_timers(&game);
        self.game = Some(game);

        metrics::round_started();
        log::info!("Room {}: round {} started", self.id, round_id);

        Ok(round_id)
    }

    async fn place_bet(
        &mut self,
        participant: ParticipantId,
        display_name: String,
        class: &str,
        amount: Points,
    ) -> GameResult<BetReceipt> {
        let game = self.game.as_ref().ok_or(GameError::NoActiveGame)?;
        let class: BetClass = class.parse()?;

        let mut updated = game.clone();
        updated.place_bet(
            participant,
            &display_name,
            class,
            amount,
            &self.config.limits,
            Utc::now(),
        )?;
        self.store.save_game(&updated).await?;

        let receipt = BetReceipt {
            round_id: updated.round_id.clone(),
            class,
            amount,
            class_stake: updated.stake(participant, class),
            total_stake: updated.participant_total(participant),
        };
        self.game = Some(updated);

        self.announce(narration::bet_accepted(
            &display_name,
            class,
            amount,
            receipt.class_stake,
        ))
        .await;
        metrics::bet_placed();
        log::debug!(
            "Room {}: {} bet {} on {}",
            self.id,
            participant,
            amount,
            class
        );

        Ok(receipt)
    }

    async fn close_betting(&mut self) -> GameResult<()> {
        if self.processing {
            return Err(GameError::AlreadyProcessing);
        }
        let game = self.game.as_ref().ok_or(GameError::NoActiveGame)?;
        if game.phase != Phase::Betting {
            return Err(GameError::BettingClosed);
        }

        let mut updated = game.clone();
        updated.phase = Phase::Dealing;
        self.store.save_game(&updated).await?;
        self.processing = true;

        let round_id = updated.round_id.clone();
        self.scheduler
            .cancel_all(Some(TaskCategory::Countdown), Some(&round_id));
        self.scheduler
            .cancel_all(Some(TaskCategory::AutoClose), Some(&round_id));
        self.schedule_timer(
            TaskCategory::Watchdog,
            self.config.watchdog_timeout,
            TimerEvent::Watchdog {
                round_id: round_id.clone(),
            },
        );

        self.announce(narration::bet_summary(&updated)).await;
        self.game = Some(updated);
        log::info!("Room {}: betting closed for round {}", self.id, round_id);

        self.spawn_deal(round_id);
        Ok(())
    }

    /// Apply the deal result and settle the round.
    async fn finish(&mut self, draws: Draws) -> GameResult<()> {
        let game = self.game.as_ref().ok_or(GameError::NoActiveGame)?;

        let mut updated = game.clone();
        updated.draws = draws;
        let outcome = Outcome::from_draws(&updated.draws);
        updated.outcome = Some(outcome);
        updated.phase = Phase::Finished;
        let settlements = updated.settle(self.config.tie_multiplier);

        self.store.save_game(&updated).await?;
        self.processing = false;

        let round_id = updated.round_id.clone();
        self.scheduler
            .cancel_all(Some(TaskCategory::Watchdog), Some(&round_id));

        let record = GameRecord {
            game: updated.clone(),
            settlements: settlements.clone(),
            archived_at: Utc::now(),
        };
        let store = self.store.clone();
        let room = self.id;
        tokio::spawn(async move {
            if let Err(e) = store.archive(&record).await {
                log::warn!(
                    "Room {}: failed to archive round {}: {}",
                    room,
                    record.game.round_id,
                    e
                );
            }
        });

        self.announce(narration::result(&updated, &outcome, &settlements))
            .await;
        self.game = Some(updated);
        self.schedule_after_result(round_id.clone());

        metrics::round_finished(&outcome.winner.to_string());
        log::info!(
            "Room {}: round {} finished, {} wins ({} vs {})",
            self.id,
            round_id,
            outcome.winner,
            outcome.total_a,
            outcome.total_b
        );

        Ok(())
    }

    async fn force_stop(&mut self) -> GameResult<bool> {
        let had_game = self.game.is_some();
        self.reset_runtime();
        self.auto_repeat = false;
        self.game = None;

        // Both records go even if one write fails. The first error is reported.
        let cleared = self.store.set_auto_repeat(self.id, false).await;
        let deleted = self.store.delete_game(self.id).await;

        if had_game {
            self.announce(narration::round_stopped()).await;
            metrics::round_abandoned("force_stop");
        }

        match (&cleared, &deleted) {
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Room {}: force stop left stale records: {}", self.id, e);
            }
            _ => log::info!("Room {}: force stopped", self.id),
        }

        cleared?;
        deleted?;
        Ok(had_game)
    }

    async fn set_auto_repeat(&mut self, enabled: bool) -> GameResult<Option<RoundId>> {
        self.store.set_auto_repeat(self.id, enabled).await?;
        self.auto_repeat = enabled;
        self.announce(narration::auto_repeat(enabled)).await;
        log::info!("Room {}: auto repeat {}", self.id, enabled);

        if enabled {
            if self.game.as_ref().is_none_or(Game::is_finished) {
                return self.start_game().await.map(Some);
            }
            return Ok(None);
        }

        self.scheduler.cancel_all(Some(TaskCategory::AutoNext), None);
        // The pending auto-next was the only thing that would have replaced
        // a finished round.
        if let Some(game) = &self.game
            && game.is_finished()
        {
            let round_id = game.round_id.clone();
            self.schedule_timer(
                TaskCategory::Cleanup,
                self.config.cleanup_delay,
                TimerEvent::Cleanup { round_id },
            );
        }
        Ok(None)
    }

    fn status(&self) -> RoomStatus {
        let now = Utc::now();
        let game = self.game.as_ref();

        RoomStatus {
            room_id: self.id,
            phase: game.map(|g| g.phase),
            round_id: game.map(|g| g.round_id.clone()),
            betting_deadline: game.map(|g| g.betting_deadline),
            seconds_remaining: game.map(|g| (g.betting_deadline - now).num_seconds().max(0)),
            bets: game.map(|g| g.bets.clone()).unwrap_or_default(),
            draws: game.map(|g| g.draws.clone()),
            outcome: game.and_then(|g| g.outcome),
            auto_repeat: self.auto_repeat,
            processing: self.processing,
            pending_effects: self.queue.pending(),
            scheduled_tasks: self.scheduler.pending(None, None),
        }
    }

    /// Bring the in-memory state in line with the store.
    ///
    /// Does nothing while a close or deal is running in this process.
    async fn recover(&mut self) -> GameResult<RecoveryPlan> {
        if self.processing {
            log::debug!("Room {}: recovery skipped, round in progress", self.id);
            return Ok(RecoveryPlan::AlreadyProcessing);
        }

        let game = self.store.load_game(self.id).await?;
        self.auto_repeat = self.store.auto_repeat(self.id).await?;

        let plan = plan_recovery(
            game.as_ref(),
            self.auto_repeat,
            Utc::now(),
            self.config.recovery_grace,
        );

        let Some(game) = game else {
            return Ok(plan);
        };

        self.scheduler.cancel_all(None, None);
        self.queue.set_active_game(game.round_id.clone());
        let round_id = game.round_id.clone();
        self.game = Some(game);

        match plan {
            RecoveryPlan::CloseOverdue => {
                log::warn!(
                    "Room {}: round {} is past its deadline, closing",
                    self.id,
                    round_id
                );
                self.close_betting().await?;
            }
            RecoveryPlan::ResumeBetting => {
                if let Some(game) = self.game.clone() {
                    self.schedule_betting_timers(&game);
                }
            }
            RecoveryPlan::AbortDealing => {
                self.abandon("recovered_mid_deal").await;
            }
            RecoveryPlan::ResumeAutoNext | RecoveryPlan::ResumeCleanup => {
                self.schedule_after_result(round_id);
            }
            RecoveryPlan::Idle | RecoveryPlan::AlreadyProcessing => {}
        }

        Ok(plan)
    }

    // === Timers and the deal task ===

    async fn handle_timer(&mut self, event: TimerEvent) -> anyhow::Result<()> {
        let Some(game) = &self.game else {
            log::debug!("Room {}: dropping {:?}, no round", self.id, event);
            return Ok(());
        };
        if &game.round_id != event.round_id() {
            log::debug!("Room {}: dropping stale {:?}", self.id, event);
            return Ok(());
        }
        let phase = game.phase;

        match event {
            TimerEvent::Countdown { seconds_left, .. } if phase == Phase::Betting => {
                let seconds_left = i64::try_from(seconds_left).unwrap_or(i64::MAX);
                self.announce(narration::countdown(seconds_left)).await;
            }
            TimerEvent::AutoClose { .. } if phase == Phase::Betting && !self.processing => {
                self.close_betting().await?;
            }
            TimerEvent::AutoNext { .. } if phase == Phase::Finished && self.auto_repeat => {
                self.start_game().await?;
            }
            TimerEvent::Cleanup { round_id } if phase == Phase::Finished => {
                self.store.delete_game(self.id).await?;
                self.game = None;
                log::info!("Room {}: round {} cleaned up", self.id, round_id);
            }
            TimerEvent::Watchdog { round_id } if phase == Phase::Dealing => {
                log::error!(
                    "Room {}: round {} stuck in dealing for {:?}",
                    self.id,
                    round_id,
                    self.config.watchdog_timeout
                );
                self.abandon("watchdog").await;
            }
            event => {
                log::debug!("Room {}: ignoring {:?} in {}", self.id, event, phase);
            }
        }

        Ok(())
    }

    async fn handle_deal_finished(&mut self, round_id: RoundId, result: Result<Draws, QueueError>) {
        let current = self
            .game
            .as_ref()
            .is_some_and(|g| g.round_id == round_id && g.phase == Phase::Dealing);
        if !current {
            log::debug!("Room {}: ignoring deal result of {}", self.id, round_id);
            return;
        }
        self.deal_task = None;

        match result {
            Ok(draws) => {
                // A failed finish stays in Dealing for the watchdog.
                if let Err(e) = self.finish(draws).await {
                    log::error!(
                        "Room {}: failed to finish round {}: {}",
                        self.id,
                        round_id,
                        e
                    );
                }
            }
            Err(e) => {
                log::error!("Room {}: deal of {} failed: {}", self.id, round_id, e);
                self.abandon("deal_failed").await;
            }
        }
    }

    fn spawn_deal(&mut self, round_id: RoundId) {
        let queue = self.queue.clone();
        let sender = self.sender.clone();
        let room = self.id;

        self.deal_task = Some(tokio::spawn(async move {
            let result = dealer::deal(&queue, room).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender
                    .send(RoomMessage::DealFinished { round_id, result })
                    .await;
            }
        }));
    }

    fn schedule_betting_timers(&self, game: &Game) {
        let until_deadline = (game.betting_deadline - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        for offset in &self.config.countdown_offsets {
            if *offset >= until_deadline {
                continue;
            }
            self.schedule_timer(
                TaskCategory::Countdown,
                until_deadline - *offset,
                TimerEvent::Countdown {
                    round_id: game.round_id.clone(),
                    seconds_left: offset.as_secs(),
                },
            );
        }

        self.schedule_timer(
            TaskCategory::AutoClose,
            until_deadline,
            TimerEvent::AutoClose {
                round_id: game.round_id.clone(),
            },
        );
    }

    /// AutoNext in auto mode, Cleanup otherwise.
    fn schedule_after_result(&self, round_id: RoundId) {
        if self.auto_repeat {
            self.schedule_timer(
                TaskCategory::AutoNext,
                self.config.auto_next_delay,
                TimerEvent::AutoNext { round_id },
            );
        } else {
            self.schedule_timer(
                TaskCategory::Cleanup,
                self.config.cleanup_delay,
                TimerEvent::Cleanup { round_id },
            );
        }
    }

    fn schedule_timer(&self, category: TaskCategory, delay: Duration, event: TimerEvent) -> TaskId {
        let sender = self.sender.clone();
        let round_id = event.round_id().clone();
        let room = self.id;

        self.scheduler
            .schedule_fn(category, round_id, delay, move || {
                let sender = sender.clone();
                let event = event.clone();
                async move {
                    let Some(sender) = sender.upgrade() else {
                        return Ok(());
                    };
                    let (tx, rx) = oneshot::channel();
                    if sender
                        .send(RoomMessage::Timer {
                            event,
                            response: tx,
                        })
                        .await
                        .is_err()
                    {
                        log::debug!("Room {}: timer fired after shutdown", room);
                        return Ok(());
                    }
                    rx.await
                        .map_err(|_| anyhow::anyhow!("room {room} dropped a timer"))?
                }
            })
    }

    // === Cleanup ===

    /// Stop timers, the deal and pending effects.
    fn reset_runtime(&mut self) {
        self.scheduler.cancel_all(None, None);
        if let Some(task) = self.deal_task.take() {
            task.abort();
        }
        self.processing = false;
        self.queue.clear();
    }

    /// Force-clean a round that cannot complete and tell the room.
    ///
    /// Store failures are logged only: the in-memory room is idle afterwards
    /// either way.
    async fn abandon(&mut self, reason: &'static str) {
        let round_id = self.game.take().map(|g| g.round_id);
        self.reset_runtime();
        self.auto_repeat = false;

        if let Err(e) = self.store.set_auto_repeat(self.id, false).await {
            log::error!("Room {}: failed to clear auto repeat: {}", self.id, e);
        }
        if let Err(e) = self.store.delete_game(self.id).await {
            log::error!("Room {}: failed to delete abandoned round: {}", self.id, e);
        }

        if let Some(round_id) = round_id {
            log::warn!(
                "Room {}: round {} abandoned ({})",
                self.id,
                round_id,
                reason
            );
            self.announce(narration::round_failed(round_id.as_str()))
                .await;
        }
        metrics::round_abandoned(reason);
    }

    /// Non-blocking notification to the room.
    async fn announce(&self, text: String) {
        if let Err(e) = self.queue.enqueue_notify(self.id, text, false).await {
            log::warn!("Room {}: could not queue notification: {}", self.id, e);
        }
    }
}
