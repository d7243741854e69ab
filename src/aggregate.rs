//! Scoped aggregation of unread/new counts and the presentation policies
//! derived from them.

use crate::catalog::CategoryTree;
use crate::classify::Policy;
use crate::preferences::ViewerPreferences;
use crate::state::StateStore;
use crate::types::{CategoryId, Counts, GroupId, ScopeKeys, TopicState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Query key for aggregation. Computed on demand, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Everything,
    Category {
        id: CategoryId,
        include_subcategories: bool,
    },
    Tag {
        name: String,
    },
    GroupInbox {
        group_id: GroupId,
    },
}

impl Scope {
    pub fn category(id: u64) -> Self {
        Scope::Category {
            id: CategoryId(id),
            include_subcategories: true,
        }
    }

    pub fn category_only(id: u64) -> Self {
        Scope::Category {
            id: CategoryId(id),
            include_subcategories: false,
        }
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Scope::Tag { name: name.into() }
    }

    pub fn group(group_id: u64) -> Self {
        Scope::GroupInbox {
            group_id: GroupId(group_id),
        }
    }

    /// Does a record with these keys fall inside the scope?
    pub fn matches(&self, keys: &ScopeKeys, tree: &CategoryTree) -> bool {
        self.matches_parts(keys.category_id, &keys.tags, &keys.group_ids, tree)
    }

    /// Like [`Scope::matches`] but without cloning keys out of the record.
    pub fn contains(&self, record: &TopicState, tree: &CategoryTree) -> bool {
        self.matches_parts(record.category_id, &record.tags, &record.group_ids, tree)
    }

    fn matches_parts(
        &self,
        category_id: Option<CategoryId>,
        tags: &BTreeSet<String>,
        group_ids: &BTreeSet<GroupId>,
        tree: &CategoryTree,
    ) -> bool {
        match self {
            Scope::Everything => true,
            Scope::Category {
                id,
                include_subcategories,
            } => match category_id {
                Some(category) if *include_subcategories => tree.is_within(category, *id),
                Some(category) => category == *id,
                None => false,
            },
            Scope::Tag { name } => tags.contains(name),
            Scope::GroupInbox { group_id } => group_ids.contains(group_id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Everything => write!(f, "everything"),
            Scope::Category {
                id,
                include_subcategories: true,
            } => write!(f, "category:{}", id),
            Scope::Category { id, .. } => write!(f, "category:{}/none", id),
            Scope::Tag { name } => write!(f, "tag:{}", name),
            Scope::GroupInbox { group_id } => write!(f, "group:{}", group_id),
        }
    }
}

/// Where a sidebar link for a scope should point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Unread,
    New,
    Latest,
}

impl LinkTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkTarget::Unread => "unread",
            LinkTarget::New => "new",
            LinkTarget::Latest => "latest",
        }
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which count a badge reflects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    Unread,
    New,
}

/// Suffix rendered next to a sidebar entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Badge {
    Count { count: usize, kind: BadgeKind },
    Dot { kind: BadgeKind },
}

impl Badge {
    /// Text for count badges, e.g. `"3 unread"`.
    pub fn label(&self) -> Option<String> {
        match self {
            Badge::Count {
                count,
                kind: BadgeKind::Unread,
            } => Some(format!("{} unread", count)),
            Badge::Count {
                count,
                kind: BadgeKind::New,
            } => Some(format!("{} new", count)),
            Badge::Dot { .. } => None,
        }
    }
}

/// Count unread and new topics within `scope`. O(known topics).
pub fn count(store: &StateStore, scope: &Scope, policy: &Policy<'_>) -> Counts {
    let mut counts = Counts::default();
    for record in store.iter().filter(|r| scope.contains(r, policy.categories)) {
        let class = policy.classify(record);
        if class.unread {
            counts.unread += 1;
        } else if class.new {
            counts.new += 1;
        }
    }
    counts
}

/// Counts for several scopes in a single scan of the store, in `scopes` order.
pub fn count_all(store: &StateStore, scopes: &[Scope], policy: &Policy<'_>) -> Vec<Counts> {
    let mut totals = vec![Counts::default(); scopes.len()];
    if scopes.is_empty() {
        return totals;
    }
    for record in store.iter() {
        let class = policy.classify(record);
        if !class.is_unread_or_new() {
            continue;
        }
        for (scope, counts) in scopes.iter().zip(totals.iter_mut()) {
            if !scope.contains(record, policy.categories) {
                continue;
            }
            if class.unread {
                counts.unread += 1;
            } else {
                counts.new += 1;
            }
        }
    }
    totals
}

/// Unread beats new beats latest. With `link_to_filtered_list` off every
/// link goes to latest.
pub fn link_target(counts: Counts, prefs: &ViewerPreferences) -> LinkTarget {
    if !prefs.link_to_filtered_list {
        return LinkTarget::Latest;
    }
    if counts.unread > 0 {
        LinkTarget::Unread
    } else if counts.new > 0 {
        LinkTarget::New
    } else {
        LinkTarget::Latest
    }
}

/// Badge for `counts`; `None` once both counts are zero.
pub fn badge(counts: Counts, prefs: &ViewerPreferences) -> Option<Badge> {
    let (count, kind) = if counts.unread > 0 {
        (counts.unread, BadgeKind::Unread)
    } else if counts.new > 0 {
        (counts.new, BadgeKind::New)
    } else {
        return None;
    };

    Some(if prefs.show_count_of_new_items {
        Badge::Count { count, kind }
    } else {
        Badge::Dot { kind }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CategoryInfo, TagLevels};
    use crate::state::TopicPatch;
    use crate::types::{NotificationLevel, TopicId};

    fn tree() -> CategoryTree {
        CategoryTree::new(&[CategoryInfo::root(5), CategoryInfo::child(6, 5), CategoryInfo::root(7)]).unwrap()
    }

    fn tracked(highest: u32, last_read: u32) -> TopicPatch {
        TopicPatch::new()
            .highest(highest)
            .last_read(last_read)
            .level(NotificationLevel::Tracking)
    }

    #[test]
    fn test_link_target_precedence() {
        let prefs = ViewerPreferences::default();
        assert_eq!(link_target(Counts { unread: 2, new: 0 }, &prefs), LinkTarget::Unread);
        assert_eq!(link_target(Counts { unread: 0, new: 3 }, &prefs), LinkTarget::New);
        assert_eq!(link_target(Counts { unread: 0, new: 0 }, &prefs), LinkTarget::Latest);
        assert_eq!(link_target(Counts { unread: 1, new: 1 }, &prefs).as_str(), "unread");
    }

    #[test]
    fn test_link_target_unfiltered() {
        let prefs = ViewerPreferences {
            link_to_filtered_list: false,
            ..Default::default()
        };
        assert_eq!(link_target(Counts { unread: 2, new: 0 }, &prefs), LinkTarget::Latest);
    }

    #[test]
    fn test_badge_modes() {
        let mut prefs = ViewerPreferences::default();
        let counts = Counts { unread: 0, new: 3 };
        assert_eq!(badge(counts, &prefs), Some(Badge::Dot { kind: BadgeKind::New }));

        prefs.show_count_of_new_items = true;
        let b = badge(counts, &prefs).unwrap();
        assert_eq!(b.label().as_deref(), Some("3 new"));

        let b = badge(Counts { unread: 2, new: 3 }, &prefs).unwrap();
        assert_eq!(b.label().as_deref(), Some("2 unread"));

        assert_eq!(badge(Counts::default(), &prefs), None);
    }

    #[test]
    fn test_count_by_scope() {
        let tree = tree();
        let prefs = ViewerPreferences::default();
        let tags = TagLevels::default();
        let policy = Policy::new(&prefs, &tree, &tags);

        let mut store = StateStore::new();
        store.upsert(TopicId(1), &tracked(10, 8).category(CategoryId(5)));
        store.upsert(TopicId(2), &tracked(10, 8).category(CategoryId(6)).tags(["foo"]));
        store.upsert(
            TopicId(3),
            &TopicPatch::new().category(CategoryId(7)).new_period(true).group(GroupId(9)),
        );

        assert_eq!(count(&store, &Scope::category(5), &policy), Counts { unread: 2, new: 0 });
        assert_eq!(count(&store, &Scope::category_only(5), &policy), Counts { unread: 1, new: 0 });
        assert_eq!(count(&store, &Scope::tag("foo"), &policy), Counts { unread: 1, new: 0 });
        assert_eq!(count(&store, &Scope::group(9), &policy), Counts { unread: 0, new: 1 });
        assert_eq!(count(&store, &Scope::Everything, &policy), Counts { unread: 2, new: 1 });
        assert_eq!(count(&store, &Scope::category(99), &policy), Counts::default());

        let scopes = [Scope::category(5), Scope::group(9), Scope::tag("bar")];
        let batch = count_all(&store, &scopes, &policy);
        for (scope, counts) in scopes.iter().zip(batch) {
            assert_eq!(counts, count(&store, scope, &policy), "{}", scope);
        }
        assert!(count_all(&store, &[], &policy).is_empty());
    }

    #[test]
    fn test_scope_matches_keys() {
        let tree = tree();
        let keys = ScopeKeys {
            category_id: Some(CategoryId(6)),
            ..Default::default()
        };
        assert!(Scope::category(5).matches(&keys, &tree));
        assert!(!Scope::category_only(5).matches(&keys, &tree));
        assert!(!Scope::tag("foo").matches(&keys, &tree));
        assert_eq!(Scope::category(5).to_string(), "category:5");
    }
}
