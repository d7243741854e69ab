//! Field-by-field merge of partial updates into a topic record.

use crate::types::{CategoryId, GroupId, NotificationLevel, ScopeKeys, Timestamp, TopicId, TopicState};
use std::collections::BTreeSet;

/// A partial update. `None` fields leave the record untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopicPatch {
    pub category_id: Option<CategoryId>,
    pub tags: Option<BTreeSet<String>>,
    /// Groups to add; group membership accumulates.
    pub add_groups: BTreeSet<GroupId>,
    pub remove_groups: BTreeSet<GroupId>,
    pub highest_post_number: Option<u32>,
    pub last_read_post_number: Option<u32>,
    /// Clears `last_read_post_number`. Wins over `last_read_post_number`.
    pub reset_last_read: bool,
    pub notification_level: Option<NotificationLevel>,
    pub group_level: Option<(GroupId, NotificationLevel)>,
    pub created_in_new_period: Option<bool>,
    pub created_at: Option<Timestamp>,
}

impl TopicPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highest(mut self, post_number: u32) -> Self {
        self.highest_post_number = Some(post_number);
        self
    }

    pub fn last_read(mut self, post_number: u32) -> Self {
        self.last_read_post_number = Some(post_number);
        self
    }

    pub fn reset_read(mut self) -> Self {
        self.reset_last_read = true;
        self
    }

    pub fn level(mut self, level: NotificationLevel) -> Self {
        self.notification_level = Some(level);
        self
    }

    pub fn category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn group(mut self, group_id: GroupId) -> Self {
        self.add_groups.insert(group_id);
        self
    }

    pub fn new_period(mut self, value: bool) -> Self {
        self.created_in_new_period = Some(value);
        self
    }
}

/// Which scope-relevant fields an upsert changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangedFields {
    pub category: bool,
    pub tags: bool,
    pub groups: bool,
    pub highest_post_number: bool,
    pub last_read_post_number: bool,
    pub notification_level: bool,
    pub new_period: bool,
}

impl ChangedFields {
    pub fn is_empty(&self) -> bool {
        *self == ChangedFields::default()
    }

    /// Every field, for records that appeared or disappeared.
    pub fn all() -> Self {
        Self {
            category: true,
            tags: true,
            groups: true,
            highest_post_number: true,
            last_read_post_number: true,
            notification_level: true,
            new_period: true,
        }
    }
}

/// Outcome of a single store mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedDiff {
    pub topic_id: TopicId,
    pub changed: ChangedFields,
    /// Scope keys before the mutation (`None` if the record was created).
    pub before: Option<ScopeKeys>,
    /// Scope keys after the mutation (`None` if the record was removed).
    pub after: Option<ScopeKeys>,
}

impl AppliedDiff {
    /// True if nothing visible changed (e.g. a duplicate echo).
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Apply `patch` to `state` in place, returning what changed.
///
/// `highest_post_number` never decreases and `last_read_post_number` only
/// increases unless `reset_last_read` is set. Read position is clamped to the
/// highest post after the merge.
pub fn apply_patch(state: &mut TopicState, patch: &TopicPatch) -> ChangedFields {
    let mut changed = ChangedFields::default();

    if let Some(category_id) = patch.category_id {
        if state.category_id != Some(category_id) {
            state.category_id = Some(category_id);
            changed.category = true;
        }
    }

    if let Some(ref tags) = patch.tags {
        if &state.tags != tags {
            state.tags = tags.clone();
            changed.tags = true;
        }
    }

    for group in &patch.add_groups {
        changed.groups |= state.group_ids.insert(*group);
    }
    for group in &patch.remove_groups {
        changed.groups |= state.group_ids.remove(group);
        if state.group_levels.remove(group).is_some() {
            changed.notification_level = true;
        }
    }

    if let Some(highest) = patch.highest_post_number {
        if highest > state.highest_post_number {
            state.highest_post_number = highest;
            changed.highest_post_number = true;
        }
    }

    if patch.reset_last_read {
        if state.last_read_post_number.take().is_some() {
            changed.last_read_post_number = true;
        }
    } else if let Some(incoming) = patch.last_read_post_number {
        let incoming = incoming.min(state.highest_post_number);
        let advances = state.last_read_post_number.map_or(true, |current| incoming > current);
        if advances {
            state.last_read_post_number = Some(incoming);
            changed.last_read_post_number = true;
        }
    }

    if let Some(level) = patch.notification_level {
        if state.notification_level != Some(level) {
            state.notification_level = Some(level);
            changed.notification_level = true;
        }
    }

    if let Some((group, level)) = patch.group_level {
        if state.group_levels.insert(group, level) != Some(level) {
            changed.notification_level = true;
        }
    }

    if let Some(value) = patch.created_in_new_period {
        if state.created_in_new_period != Some(value) {
            state.created_in_new_period = Some(value);
            changed.new_period = true;
        }
    }

    if let Some(created_at) = patch.created_at {
        if state.created_at != Some(created_at) {
            state.created_at = Some(created_at);
            changed.new_period = true;
        }
    }

    changed
}
