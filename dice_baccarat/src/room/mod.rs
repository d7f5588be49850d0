//! Rooms: one actor per chat room owning that room's round.
//!
//! Each room runs in its own tokio task with an mpsc inbox, so everything
//! that touches a round (requests, timers, the deal result) is applied one
//! message at a time. The [`RoomManager`] spawns actors on demand and at
//! startup for every room that has persisted state.

pub mod actor;
pub mod config;
pub mod dealer;
pub mod manager;
pub mod messages;
pub mod recovery;

pub use actor::{RoomActor, RoomHandle};
pub use config::GameConfig;
pub use manager::RoomManager;
pub use messages::{BetReceipt, RoomMessage, RoomStatus, TimerEvent};
pub use recovery::{RecoveryPlan, plan_recovery};
