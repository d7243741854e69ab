//! Lifecycle-scoped callback registry.
//!
//! UI surfaces register interest in a [`Scope`](crate::Scope) and receive
//! fresh counts whenever a mutation could change that scope's aggregate.
//! Registration returns a [`Subscription`] handle; dropping it (or calling
//! `unregister`, any number of times) removes the callback.
//!
//! # Example
//!
//! ```ignore
//! let handle = tracker.register(Scope::tag("foo"), |scope, counts| {
//!     println!("{scope}: {} unread, {} new", counts.unread, counts.new);
//! });
//!
//! // Section torn down.
//! drop(handle);
//! ```

mod manager;
mod types;

pub use manager::CallbackRegistry;
pub use types::{Callback, Subscription, SubscriptionId};
