//! Topic state records and their merge rules.
//!
//! Every mutation goes through [`apply_patch`], which enforces the
//! monotonic read-state invariants and reports which scope-relevant fields
//! changed so callers can skip notification for no-op echoes.

mod merge;
mod store;

pub use merge::{apply_patch, AppliedDiff, ChangedFields, TopicPatch};
pub use store::StateStore;
