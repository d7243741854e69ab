//! Optimistic local bulk mutations (dismiss) and the fire-and-forget
//! requests that persist them server-side.

use crate::aggregate::Scope;
use crate::classify::Policy;
use crate::state::{AppliedDiff, StateStore};
use crate::types::{TopicId, TopicState};
use serde::{Deserialize, Serialize};

/// What a dismiss clears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissKind {
    /// Mark every matching topic fully read.
    #[default]
    All,
    /// Mark only currently-unread topics fully read.
    Unread,
    /// Clear the new flag on currently-new topics.
    New,
}

/// Request for the API collaborator to persist a dismissal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRequest {
    pub scope: Scope,
    pub kind: DismissKind,
    /// Topics whose local state changed.
    pub topic_ids: Vec<TopicId>,
}

/// Apply a dismiss to every record in `scope`. Returns the diffs produced;
/// records that were already in the target state produce none.
pub fn dismiss(store: &mut StateStore, scope: &Scope, kind: DismissKind, policy: &Policy<'_>) -> Vec<AppliedDiff> {
    let in_scope = |record: &TopicState| scope.contains(record, policy.categories);

    let mut diffs = match kind {
        DismissKind::All => store.mark_read_where(in_scope),
        DismissKind::Unread => store.mark_read_where(|r| in_scope(r) && policy.classify(r).unread),
        DismissKind::New => store.mark_seen_where(|r| in_scope(r) && policy.classify(r).new),
    };
    diffs.sort_by_key(|d| d.topic_id);
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategoryInfo, CategoryTree, TagLevels};
    use crate::preferences::ViewerPreferences;
    use crate::state::TopicPatch;
    use crate::aggregate::count;
    use crate::types::{CategoryId, NotificationLevel};

    fn fixture() -> (ViewerPreferences, CategoryTree, TagLevels, StateStore) {
        let tree = CategoryTree::new(&[CategoryInfo::root(5), CategoryInfo::root(6)]).unwrap();
        let mut store = StateStore::new();
        store.upsert(
            TopicId(1),
            &TopicPatch::new()
                .highest(10)
                .last_read(8)
                .level(NotificationLevel::Tracking)
                .category(CategoryId(5)),
        );
        store.upsert(
            TopicId(2),
            &TopicPatch::new().highest(2).new_period(true).category(CategoryId(5)),
        );
        store.upsert(
            TopicId(3),
            &TopicPatch::new()
                .highest(4)
                .last_read(1)
                .level(NotificationLevel::Watching)
                .category(CategoryId(6)),
        );
        (ViewerPreferences::default(), tree, TagLevels::default(), store)
    }

    #[test]
    fn test_dismiss_all_in_scope() {
        let (prefs, tree, tags, mut store) = fixture();
        let policy = Policy::new(&prefs, &tree, &tags);

        let diffs = dismiss(&mut store, &Scope::category(5), DismissKind::All, &policy);
        assert_eq!(diffs.iter().map(|d| d.topic_id).collect::<Vec<_>>(), vec![TopicId(1), TopicId(2)]);
        assert!(count(&store, &Scope::category(5), &policy).is_zero());
        // Out of scope untouched.
        assert_eq!(count(&store, &Scope::category(6), &policy).unread, 1);

        // Second dismiss changes nothing.
        assert!(dismiss(&mut store, &Scope::category(5), DismissKind::All, &policy).is_empty());
    }

    #[test]
    fn test_dismiss_unread_keeps_new() {
        let (prefs, tree, tags, mut store) = fixture();
        let policy = Policy::new(&prefs, &tree, &tags);

        dismiss(&mut store, &Scope::Everything, DismissKind::Unread, &policy);
        let counts = count(&store, &Scope::Everything, &policy);
        assert_eq!(counts.unread, 0);
        assert_eq!(counts.new, 1);
    }

    #[test]
    fn test_dismiss_new_keeps_unread() {
        let (prefs, tree, tags, mut store) = fixture();
        let policy = Policy::new(&prefs, &tree, &tags);

        let diffs = dismiss(&mut store, &Scope::Everything, DismissKind::New, &policy);
        assert_eq!(diffs.len(), 1);
        assert!(!store.get(TopicId(2)).unwrap().in_new_period());
        assert_eq!(count(&store, &Scope::Everything, &policy).unread, 2);
    }
}
