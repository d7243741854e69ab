//! # Topic Tracker
//!
//! A client-side tracking engine for a forum: it ingests real-time events
//! from publish/subscribe channels, keeps one record per known topic, and
//! serves unread/new counts per scope to any number of UI subscribers.
//!
//! ## Core Concepts
//!
//! - **State store**: one [`TopicState`] per topic; merges are monotonic
//! - **Channels**: per-user and per-group event streams, decoded defensively
//! - **Classification**: pure unread/new/neither policy per topic
//! - **Aggregation**: counts per [`Scope`] (everything, category, tag, group inbox)
//! - **Callbacks**: scope registrations released by dropping a handle
//! - **Dismiss**: optimistic bulk mark-read with a single notification pass
//!
//! ## Example
//!
//! ```ignore
//! use topic_tracker::{Scope, TopicTracker, TrackerConfig};
//!
//! let tracker = TopicTracker::new(TrackerConfig::for_viewer(1))?;
//! tracker.load_states(records);
//!
//! let handle = tracker.register(Scope::category(5), |_, counts| {
//!     println!("{} unread, {} new", counts.unread, counts.new);
//! });
//!
//! tracker.deliver(&message);
//! tracker.dismiss(&Scope::category(5));
//! drop(handle);
//! ```

pub mod aggregate;
pub mod bulk;
pub mod catalog;
pub mod channels;
pub mod classify;
pub mod error;
pub mod incoming;
pub mod preferences;
pub mod registry;
pub mod state;
pub mod tracker;
pub mod types;

// Re-exports
pub use aggregate::{Badge, BadgeKind, LinkTarget, Scope};
pub use bulk::{BulkRequest, DismissKind};
pub use catalog::{CategoryInfo, CategoryTree, TagLevels};
pub use channels::{ChannelDescriptor, ChannelMessage, ChannelSubscriptions, Effect, TrackingMessage};
pub use classify::{Classification, Policy};
pub use error::{Result, TrackerError};
pub use incoming::{IncomingFilter, IncomingTracker};
pub use preferences::ViewerPreferences;
pub use registry::{CallbackRegistry, Subscription, SubscriptionId};
pub use state::{AppliedDiff, ChangedFields, StateStore, TopicPatch};
pub use tracker::{TopicTracker, TrackerConfig};
pub use types::*;
