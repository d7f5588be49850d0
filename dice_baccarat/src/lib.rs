//! # Dice Baccarat
//!
//! A chat-room dice game modelled on baccarat. Participants stake points on
//! Banker, Player or Tie, dice are rolled through the chat service, and the
//! higher total modulo 10 wins.
//!
//! ## Architecture
//!
//! Every room is a tokio actor ([`room::RoomActor`]) owning the room's round
//! and moving it through Betting, Dealing and Finished. Around it:
//!
//! - [`game`]: the round aggregate, bet validation and the drawing rules
//! - [`effects`]: the outbound channel seam and the strictly ordered effect queue
//! - [`scheduler`]: cancellable timers with bounded retry
//! - [`db`]: key/value persistence (in memory or PostgreSQL) and history
//! - [`room`]: actors, the manager and startup recovery
//!
//! ## Example
//!
//! ```no_run
//! use dice_baccarat::{GameConfig, LogChannel, MemoryStore, RoomManager};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), dice_baccarat::GameError> {
//! let manager = RoomManager::new(
//!     GameConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(LogChannel),
//! );
//! let round = manager.start_game(-100).await?;
//! manager.place_bet(-100, 7, "alice", "banker", 100).await?;
//! # let _ = round;
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod effects;
pub mod game;
pub mod metrics;
pub mod narration;
pub mod room;
pub mod scheduler;

pub use db::{GameStore, MemoryStore, PgStore, Store, StoreError};
pub use effects::{ChannelError, EffectQueue, LogChannel, OutboundChannel, QueueConfig, QueueError};
pub use game::{
    BetClass, ErrorKind, Game, GameError, GameResult, Phase, Points, RoomId, RoundId, Side,
};
pub use room::{GameConfig, RoomManager, RoomStatus};
pub use scheduler::{Scheduler, SchedulerConfig, TaskCategory};
