//! Topic state store: the single source of truth for tracked topics.

use super::merge::{apply_patch, AppliedDiff, ChangedFields, TopicPatch};
use crate::types::{Timestamp, TopicId, TopicState};
use std::collections::HashMap;
use tracing::trace;

/// Mapping from topic id to its tracking record.
///
/// Holds only topics the viewer has seen through a bootstrap load or a
/// channel event.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    states: HashMap<TopicId, TopicState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, topic_id: TopicId) -> Option<&TopicState> {
        self.states.get(&topic_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicState> {
        self.states.values()
    }

    pub fn topic_ids(&self) -> Vec<TopicId> {
        let mut ids: Vec<_> = self.states.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Merge `patch` into the record for `topic_id`, creating it if unseen.
    pub fn upsert(&mut self, topic_id: TopicId, patch: &TopicPatch) -> AppliedDiff {
        match self.states.get_mut(&topic_id) {
            Some(state) => {
                let before = state.keys();
                let changed = apply_patch(state, patch);
                trace!(%topic_id, ?changed, "topic updated");
                AppliedDiff {
                    topic_id,
                    changed,
                    before: Some(before),
                    after: Some(state.keys()),
                }
            }
            None => {
                let mut state = TopicState::new(topic_id, patch.highest_post_number.unwrap_or(1));
                apply_patch(&mut state, patch);
                let after = state.keys();
                self.states.insert(topic_id, state);
                trace!(%topic_id, "topic created");
                AppliedDiff {
                    topic_id,
                    changed: ChangedFields::all(),
                    before: None,
                    after: Some(after),
                }
            }
        }
    }

    /// Load bootstrap records, replacing any existing record for the same id.
    ///
    /// Records that do not state `created_in_new_period` get it derived from
    /// `created_at >= cutoff`. A stated flag is kept as is.
    pub fn bulk_load(&mut self, records: Vec<TopicState>, cutoff: Timestamp) -> Vec<AppliedDiff> {
        let mut diffs = Vec::with_capacity(records.len());

        for mut record in records {
            record.highest_post_number = record.highest_post_number.max(1);
            if let Some(last_read) = record.last_read_post_number {
                record.last_read_post_number = Some(last_read.min(record.highest_post_number));
            }
            if record.created_in_new_period.is_none() {
                record.created_in_new_period = Some(record.created_at.is_some_and(|at| at >= cutoff));
            }
            record.treat_as_new_topic_start_date = cutoff;

            let topic_id = record.topic_id;
            let after = record.keys();
            let diff = match self.states.insert(topic_id, record) {
                Some(previous) => {
                    let current = &self.states[&topic_id];
                    AppliedDiff {
                        topic_id,
                        changed: diff_fields(&previous, current),
                        before: Some(previous.keys()),
                        after: Some(after),
                    }
                }
                None => AppliedDiff {
                    topic_id,
                    changed: ChangedFields::all(),
                    before: None,
                    after: Some(after),
                },
            };
            diffs.push(diff);
        }

        diffs
    }

    pub fn remove(&mut self, topic_id: TopicId) -> Option<AppliedDiff> {
        let removed = self.states.remove(&topic_id)?;
        trace!(%topic_id, "topic removed");
        Some(AppliedDiff {
            topic_id,
            changed: ChangedFields::all(),
            before: Some(removed.keys()),
            after: None,
        })
    }

    /// Remove every record matching `predicate`.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<AppliedDiff>
    where
        F: FnMut(&TopicState) -> bool,
    {
        let doomed: Vec<TopicId> = self
            .states
            .values()
            .filter(|s| predicate(s))
            .map(|s| s.topic_id)
            .collect();

        doomed.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Apply a per-record patch to every record for which `f` returns one.
    /// Only diffs that changed something are returned.
    pub fn update_where<F>(&mut self, mut f: F) -> Vec<AppliedDiff>
    where
        F: FnMut(&TopicState) -> Option<TopicPatch>,
    {
        let mut diffs = Vec::new();
        for state in self.states.values_mut() {
            let Some(patch) = f(state) else {
                continue;
            };
            let before = state.keys();
            let changed = apply_patch(state, &patch);
            if !changed.is_empty() {
                diffs.push(AppliedDiff {
                    topic_id: state.topic_id,
                    changed,
                    before: Some(before),
                    after: Some(state.keys()),
                });
            }
        }
        diffs
    }

    /// Set `last_read_post_number = highest_post_number` on matching records.
    pub fn mark_read_where<F>(&mut self, mut predicate: F) -> Vec<AppliedDiff>
    where
        F: FnMut(&TopicState) -> bool,
    {
        self.update_where(|s| predicate(s).then(|| TopicPatch::new().last_read(s.highest_post_number)))
    }

    /// Clear `created_in_new_period` on matching records.
    pub fn mark_seen_where<F>(&mut self, mut predicate: F) -> Vec<AppliedDiff>
    where
        F: FnMut(&TopicState) -> bool,
    {
        self.update_where(|s| predicate(s).then(|| TopicPatch::new().new_period(false)))
    }
}

fn diff_fields(old: &TopicState, new: &TopicState) -> ChangedFields {
    ChangedFields {
        category: old.category_id != new.category_id,
        tags: old.tags != new.tags,
        groups: old.group_ids != new.group_ids,
        highest_post_number: old.highest_post_number != new.highest_post_number,
        last_read_post_number: old.last_read_post_number != new.last_read_post_number,
        notification_level: old.notification_level != new.notification_level
            || old.group_levels != new.group_levels,
        new_period: old.created_in_new_period != new.created_in_new_period
            || old.created_at != new.created_at,
    }
}
