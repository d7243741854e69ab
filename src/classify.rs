//! Classification policy: does a topic count as unread, new, or neither?

use crate::catalog::{CategoryTree, TagLevels};
use crate::preferences::ViewerPreferences;
use crate::types::{NotificationLevel, TopicState};

/// Result of classifying one record. Never both `unread` and `new`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub unread: bool,
    pub new: bool,
}

impl Classification {
    pub fn is_unread_or_new(&self) -> bool {
        self.unread || self.new
    }
}

/// Everything classification reads besides the record itself.
#[derive(Clone, Copy, Debug)]
pub struct Policy<'a> {
    pub prefs: &'a ViewerPreferences,
    pub categories: &'a CategoryTree,
    pub tags: &'a TagLevels,
}

impl<'a> Policy<'a> {
    pub fn new(prefs: &'a ViewerPreferences, categories: &'a CategoryTree, tags: &'a TagLevels) -> Self {
        Self {
            prefs,
            categories,
            tags,
        }
    }

    /// Resolve the level that governs `record`.
    ///
    /// Explicit topic level wins. Otherwise the most attentive level seen on
    /// any group channel, then the most attentive of the category default
    /// (nearest ancestor) and tag defaults, then regular.
    pub fn effective_level(&self, record: &TopicState) -> NotificationLevel {
        if let Some(level) = record.notification_level {
            return level;
        }
        if let Some(level) = record.group_levels.values().max() {
            return *level;
        }
        let category = record
            .category_id
            .and_then(|id| self.categories.default_level(id));
        let tag = self.tags.max_level(&record.tags);
        category.max(tag).unwrap_or_default()
    }

    /// True if preferences mute the topic's category (or an ancestor) or any
    /// of its tags.
    pub fn muted_by_preferences(&self, record: &TopicState) -> bool {
        let category_muted = record.category_id.is_some_and(|id| {
            self.categories
                .ancestors(id)
                .any(|a| self.prefs.muted_category_ids.contains(&a))
        });
        category_muted || record.tags.iter().any(|t| self.prefs.muted_tags.contains(t))
    }

    pub fn classify(&self, record: &TopicState) -> Classification {
        let level = self.effective_level(record);

        let unread = match record.last_read_post_number {
            Some(last_read) => last_read < record.highest_post_number && level.is_tracked(),
            None => false,
        };
        if unread {
            return Classification { unread: true, new: false };
        }

        Classification {
            unread: false,
            new: self.is_new(record, level),
        }
    }

    fn is_new(&self, record: &TopicState, level: NotificationLevel) -> bool {
        if record.last_read_post_number.is_some() || !record.in_new_period() {
            return false;
        }
        if level == NotificationLevel::Muted {
            return false;
        }
        let explicitly_tracked = record.notification_level.is_some_and(|l| l.is_tracked());
        if !explicitly_tracked && self.muted_by_preferences(record) {
            return false;
        }
        let cutoff = self
            .prefs
            .treat_as_new_topic_start_date
            .max(record.treat_as_new_topic_start_date);
        record.created_at.map_or(true, |at| at >= cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CategoryInfo;
    use crate::types::{CategoryId, GroupId, Timestamp, TopicId};

    struct Fixture {
        prefs: ViewerPreferences,
        tree: CategoryTree,
        tags: TagLevels,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                prefs: ViewerPreferences::default(),
                tree: CategoryTree::new(&[
                    CategoryInfo::root(1),
                    CategoryInfo::child(2, 1),
                    CategoryInfo::root(5).with_level(NotificationLevel::Tracking),
                ])
                .unwrap(),
                tags: TagLevels::default(),
            }
        }

        fn policy(&self) -> Policy<'_> {
            Policy::new(&self.prefs, &self.tree, &self.tags)
        }
    }

    #[test]
    fn test_unread_requires_tracking() {
        let fx = Fixture::new();
        let record = TopicState::new(TopicId(1), 10).with_last_read(8);
        assert_eq!(fx.policy().classify(&record), Classification::default());

        let record = record.with_level(NotificationLevel::Tracking);
        assert!(fx.policy().classify(&record).unread);
    }

    #[test]
    fn test_fully_read_is_neither() {
        let fx = Fixture::new();
        let record = TopicState::new(TopicId(1), 10)
            .with_last_read(10)
            .with_level(NotificationLevel::Watching);
        assert!(!fx.policy().classify(&record).is_unread_or_new());
    }

    #[test]
    fn test_category_default_makes_unread() {
        let fx = Fixture::new();
        let record = TopicState::new(TopicId(1), 10)
            .with_last_read(2)
            .with_category(CategoryId(5));
        assert!(fx.policy().classify(&record).unread);

        // Explicit topic level overrides the category default.
        let record = record.with_level(NotificationLevel::Regular);
        assert!(!fx.policy().classify(&record).unread);
    }

    #[test]
    fn test_tag_default_makes_unread() {
        let mut fx = Fixture::new();
        fx.tags.set("foo", NotificationLevel::Watching);
        let record = TopicState::new(TopicId(1), 3).with_last_read(1).with_tags(["foo"]);
        assert!(fx.policy().classify(&record).unread);
    }

    #[test]
    fn test_group_levels_take_maximum() {
        let fx = Fixture::new();
        let mut record = TopicState::new(TopicId(1), 3).with_last_read(1);
        record.group_levels.insert(GroupId(1), NotificationLevel::Regular);
        record.group_levels.insert(GroupId(2), NotificationLevel::Watching);
        assert_eq!(fx.policy().effective_level(&record), NotificationLevel::Watching);
        assert!(fx.policy().classify(&record).unread);
    }

    #[test]
    fn test_new_topic() {
        let fx = Fixture::new();
        let record = TopicState::new(TopicId(1), 1).created_in_new_period(true);
        assert_eq!(
            fx.policy().classify(&record),
            Classification { unread: false, new: true }
        );

        let opened = record.clone().with_last_read(1);
        assert!(!fx.policy().classify(&opened).new);
    }

    #[test]
    fn test_new_respects_cutoff() {
        let mut fx = Fixture::new();
        fx.prefs.treat_as_new_topic_start_date = Timestamp(100);
        let old = TopicState::new(TopicId(1), 1)
            .created_in_new_period(true)
            .with_created_at(Timestamp(50));
        let fresh = old.clone().with_created_at(Timestamp(150));
        assert!(!fx.policy().classify(&old).new);
        assert!(fx.policy().classify(&fresh).new);
    }

    #[test]
    fn test_muted_subcategory_not_new() {
        let mut fx = Fixture::new();
        fx.prefs.muted_category_ids.insert(CategoryId(1));
        let record = TopicState::new(TopicId(1), 1)
            .created_in_new_period(true)
            .with_category(CategoryId(2));
        assert!(!fx.policy().classify(&record).new);

        let watched = record.with_level(NotificationLevel::Watching);
        assert!(fx.policy().classify(&watched).new);
    }

    #[test]
    fn test_muted_topic_not_new() {
        let fx = Fixture::new();
        let record = TopicState::new(TopicId(1), 1)
            .created_in_new_period(true)
            .with_level(NotificationLevel::Muted);
        assert!(!fx.policy().classify(&record).new);
    }
}
