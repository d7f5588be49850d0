//! Outbound effects: the chat channel seam and the ordered queue in front of it.

pub mod channel;
pub mod queue;

pub use channel::{ChannelError, ChannelResult, LogChannel, OutboundChannel};
pub use queue::{EffectQueue, QueueConfig, QueueError, QueueWorker, SequenceId};
