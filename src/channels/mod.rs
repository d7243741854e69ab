//! Inbound real-time channels.
//!
//! The engine listens on a per-user channel and one channel per group inbox.
//! Each delivered message is checked against the channel's last seen bus id,
//! decoded into a [`TrackingMessage`], and translated into an [`Effect`] on
//! the state store. Anything malformed is logged and dropped.

mod manager;
mod types;

pub use manager::{ChannelSubscriptions, Dispatch, Effect};
pub use types::{ChannelDescriptor, ChannelMessage, TopicPayload, TrackingMessage};
