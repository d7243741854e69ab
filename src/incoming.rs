//! Tracks topics that arrived after a list was loaded ("N new or updated
//! topics" banner).

use crate::aggregate::Scope;
use crate::catalog::CategoryTree;
use crate::classify::Classification;
use crate::types::{TopicId, TopicState};
use serde::{Deserialize, Serialize};

/// Which list the viewer is looking at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingFilter {
    /// Only topics that are new.
    New,
    /// Only topics that are unread.
    Unread,
    /// Any topic with fresh activity.
    Latest,
}

/// Which event produced an arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrivalKind {
    NewTopic,
    Latest,
    Unread,
}

#[derive(Clone, Debug)]
struct Tracking {
    filter: IncomingFilter,
    scope: Scope,
}

/// Incoming-topic accumulator. Inactive until `track` is called.
#[derive(Clone, Debug, Default)]
pub struct IncomingTracker {
    tracking: Option<Tracking>,
    topics: Vec<TopicId>,
}

impl IncomingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) tracking; clears anything accumulated.
    pub fn track(&mut self, filter: IncomingFilter, scope: Scope) {
        self.tracking = Some(Tracking { filter, scope });
        self.topics.clear();
    }

    pub fn stop(&mut self) {
        self.tracking = None;
        self.topics.clear();
    }

    pub fn reset(&mut self) {
        self.topics.clear();
    }

    pub fn count(&self) -> usize {
        self.topics.len()
    }

    pub fn topic_ids(&self) -> &[TopicId] {
        &self.topics
    }

    /// Record an arrival if it matches the tracked filter and scope.
    /// `muted` topics never count. Returns true if the count changed.
    pub fn observe(
        &mut self,
        kind: ArrivalKind,
        record: &TopicState,
        class: Classification,
        muted: bool,
        tree: &CategoryTree,
    ) -> bool {
        let Some(tracking) = &self.tracking else {
            return false;
        };
        if muted || !tracking.scope.contains(record, tree) {
            return false;
        }

        let wanted = match tracking.filter {
            IncomingFilter::New => kind == ArrivalKind::NewTopic && class.new,
            IncomingFilter::Unread => kind == ArrivalKind::Unread && class.unread,
            IncomingFilter::Latest => true,
        };
        if !wanted || self.topics.contains(&record.topic_id) {
            return false;
        }

        self.topics.push(record.topic_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CategoryId;

    const NEW: Classification = Classification { unread: false, new: true };

    #[test]
    fn test_inactive_ignores_everything() {
        let mut incoming = IncomingTracker::new();
        let record = TopicState::new(TopicId(1), 1);
        assert!(!incoming.observe(ArrivalKind::NewTopic, &record, NEW, false, &CategoryTree::default()));
        assert_eq!(incoming.count(), 0);
    }

    #[test]
    fn test_new_filter_and_scope() {
        let tree = CategoryTree::default();
        let mut incoming = IncomingTracker::new();
        incoming.track(IncomingFilter::New, Scope::category(3));

        let inside = TopicState::new(TopicId(1), 1).with_category(CategoryId(3));
        let outside = TopicState::new(TopicId(2), 1).with_category(CategoryId(4));

        assert!(incoming.observe(ArrivalKind::NewTopic, &inside, NEW, false, &tree));
        assert!(!incoming.observe(ArrivalKind::NewTopic, &inside, NEW, false, &tree));
        assert!(!incoming.observe(ArrivalKind::NewTopic, &outside, NEW, false, &tree));
        assert!(!incoming.observe(ArrivalKind::Latest, &inside, NEW, false, &tree));
        assert_eq!(incoming.topic_ids(), &[TopicId(1)]);

        incoming.reset();
        assert_eq!(incoming.count(), 0);
    }

    #[test]
    fn test_muted_never_incoming() {
        let tree = CategoryTree::default();
        let mut incoming = IncomingTracker::new();
        incoming.track(IncomingFilter::Latest, Scope::Everything);
        let record = TopicState::new(TopicId(1), 1);
        assert!(!incoming.observe(ArrivalKind::Latest, &record, NEW, true, &tree));
        assert!(incoming.observe(ArrivalKind::Latest, &record, NEW, false, &tree));
    }
}
