//! Room manager: one actor per room, spawned on first use.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use super::{
    actor::{RoomActor, RoomHandle},
    config::GameConfig,
    messages::{BetReceipt, RoomStatus},
};
use crate::{
    db::{GameStore, Store},
    effects::OutboundChannel,
    game::{GameResult, ParticipantId, Points, RoomId, RoundId},
    metrics,
};

/// Entry point for controlling rounds in any room.
///
/// Every operation is routed to the room's actor, so calls for one room are
/// applied in order while different rooms proceed independently.
pub struct RoomManager {
    config: Arc<GameConfig>,

    store: GameStore,

    channel: Arc<dyn OutboundChannel>,

    /// Running room actors
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
}

impl RoomManager {
    pub fn new(
        config: GameConfig,
        store: Arc<dyn Store>,
        channel: Arc<dyn OutboundChannel>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store: GameStore::new(store),
            channel,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn actors for every room with persisted state.
    ///
    /// Each actor runs recovery before serving requests.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot list its keys.
    pub async fn load_existing_rooms(&self) -> GameResult<usize> {
        let rooms = self.store.known_rooms().await?;
        for room in &rooms {
            self.room(*room).await;
        }
        if !rooms.is_empty() {
            log::info!("Loaded {} rooms from the store", rooms.len());
        }
        Ok(rooms.len())
    }

    pub async fn start_game(&self, room: RoomId) -> GameResult<RoundId> {
        self.room(room).await.start_game().await
    }

    pub async fn place_bet(
        &self,
        room: RoomId,
        participant: ParticipantId,
        display_name: impl Into<String>,
        class: impl Into<String>,
        amount: Points,
    ) -> GameResult<BetReceipt> {
        self.room(room)
            .await
            .place_bet(participant, display_name, class, amount)
            .await
    }

    pub async fn close_betting(&self, room: RoomId) -> GameResult<()> {
        self.room(room).await.close_betting().await
    }

    /// Returns whether a round was running.
    pub async fn force_stop(&self, room: RoomId) -> GameResult<bool> {
        self.room(room).await.force_stop().await
    }

    /// Returns the round started because the room was idle, if any.
    pub async fn enable_auto_repeat(&self, room: RoomId) -> GameResult<Option<RoundId>> {
        self.room(room).await.set_auto_repeat(true).await
    }

    pub async fn disable_auto_repeat(&self, room: RoomId) -> GameResult<()> {
        self.room(room)
            .await
            .set_auto_repeat(false)
            .await
            .map(|_| ())
    }

    pub async fn get_status(&self, room: RoomId) -> GameResult<RoomStatus> {
        self.room(room).await.status().await
    }

    pub async fn active_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Stop every actor. Persisted rounds are recovered on the next start.
    pub async fn shutdown(&self) {
        let handles: Vec<RoomHandle> = self.rooms.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            if let Err(e) = handle.shutdown().await {
                log::warn!("Room {}: shutdown failed: {}", handle.room_id(), e);
            }
        }
        metrics::active_rooms(0);
    }

    /// Handle for `room`, spawning its actor if none is running.
    pub async fn room(&self, room: RoomId) -> RoomHandle {
        if let Some(handle) = self.rooms.read().await.get(&room)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        let mut rooms = self.rooms.write().await;
        if let Some(handle) = rooms.get(&room)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        let (actor, handle) = RoomActor::new(
            room,
            self.config.clone(),
            self.store.clone(),
            self.channel.clone(),
        );
        rooms.insert(room, handle.clone());
        metrics::active_rooms(rooms.len());
        drop(rooms);

        tokio::spawn(async move {
            actor.run().await;
        });
        log::info!("Room {}: actor spawned", room);

        handle
    }
}
