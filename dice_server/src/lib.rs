//! HTTP control surface, Telegram adapter and process wiring for
//! [`dice_baccarat`] rooms.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod telegram;
