//! Channel subscription bookkeeping and event-to-mutation translation.

use super::types::{ChannelDescriptor, ChannelMessage, TopicPayload, TrackingMessage};
use crate::state::TopicPatch;
use crate::types::{GroupId, TopicId, UserId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Store mutation requested by an inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Merge into the record, creating it if unseen.
    Upsert(TopicId, TopicPatch),
    /// Merge only if the record already exists.
    UpdateExisting(TopicId, TopicPatch),
    /// Strip groups from the record; drop it if no group remains.
    Archive(TopicId, BTreeSet<GroupId>),
    /// Clear the new flag on each topic.
    MarkSeen(Vec<TopicId>),
    Remove(TopicId),
    /// Self-action already reflected locally.
    Nothing,
}

/// An accepted event and what it does to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub channel: ChannelDescriptor,
    pub message: TrackingMessage,
    pub effect: Effect,
}

/// Open channels and the last bus id seen on each.
#[derive(Clone, Debug)]
pub struct ChannelSubscriptions {
    viewer: UserId,
    connected: BTreeMap<ChannelDescriptor, i64>,
}

impl ChannelSubscriptions {
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            connected: BTreeMap::new(),
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// Open channels. Already-open channels keep their last id. Returns the
    /// channels that were newly opened.
    pub fn connect(&mut self, channels: &[ChannelDescriptor]) -> Vec<ChannelDescriptor> {
        channels
            .iter()
            .filter(|c| self.connect_from(**c, -1))
            .copied()
            .collect()
    }

    /// Open a channel, accepting only ids above `last_id`.
    pub fn connect_from(&mut self, channel: ChannelDescriptor, last_id: i64) -> bool {
        if self.connected.contains_key(&channel) {
            return false;
        }
        debug!(%channel, last_id, "channel connected");
        self.connected.insert(channel, last_id);
        true
    }

    pub fn disconnect(&mut self, channel: &ChannelDescriptor) -> bool {
        let removed = self.connected.remove(channel).is_some();
        if removed {
            debug!(%channel, "channel disconnected");
        }
        removed
    }

    pub fn is_connected(&self, channel: &ChannelDescriptor) -> bool {
        self.connected.contains_key(channel)
    }

    pub fn connected(&self) -> Vec<ChannelDescriptor> {
        self.connected.keys().copied().collect()
    }

    pub fn last_message_id(&self, channel: &ChannelDescriptor) -> Option<i64> {
        self.connected.get(channel).copied()
    }

    /// Validate, decode and translate a delivered message.
    ///
    /// Messages on closed channels, replays, and malformed bodies are logged
    /// and dropped (`None`).
    pub fn accept(&mut self, message: &ChannelMessage) -> Option<Dispatch> {
        let channel = match ChannelDescriptor::parse(&message.channel) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(channel = %message.channel, error = %e, "dropping message");
                return None;
            }
        };

        let Some(last_id) = self.connected.get_mut(&channel) else {
            debug!(%channel, "dropping message for closed channel");
            return None;
        };
        if message.message_id <= *last_id {
            debug!(%channel, message_id = message.message_id, last_id = *last_id, "dropping replayed message");
            return None;
        }
        *last_id = message.message_id;

        let decoded = match TrackingMessage::decode(&message.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(%channel, message_id = message.message_id, error = %e, "dropping malformed message");
                return None;
            }
        };

        let effect = self.translate(channel, &decoded);
        Some(Dispatch {
            channel,
            message: decoded,
            effect,
        })
    }

    /// Map a message to its store effect, tagging it with the channel's group.
    pub fn translate(&self, channel: ChannelDescriptor, message: &TrackingMessage) -> Effect {
        let group = channel.group();

        match message {
            TrackingMessage::NewTopic { topic_id, payload } => {
                let mut patch = base_patch(payload, group);
                patch.reset_last_read = true;
                patch.created_in_new_period = Some(true);
                Effect::Upsert(*topic_id, patch)
            }
            TrackingMessage::Latest { topic_id, payload } => {
                let mut patch = base_patch(payload, group);
                patch.last_read_post_number = None;
                Effect::Upsert(*topic_id, patch)
            }
            TrackingMessage::Unread { topic_id, payload } | TrackingMessage::Read { topic_id, payload } => {
                Effect::Upsert(*topic_id, base_patch(payload, group))
            }
            TrackingMessage::GroupArchive {
                topic_id,
                acting_user_id,
                group_ids,
            } => {
                if *acting_user_id == self.viewer {
                    return Effect::Nothing;
                }
                let mut groups: BTreeSet<GroupId> = group_ids.iter().copied().collect();
                groups.extend(group);
                if groups.is_empty() {
                    return Effect::Nothing;
                }
                Effect::Archive(*topic_id, groups)
            }
            TrackingMessage::DismissNew { topic_ids } => Effect::MarkSeen(topic_ids.clone()),
            TrackingMessage::NotificationLevelChange { topic_id, level } => {
                let mut patch = TopicPatch::new();
                match group {
                    Some(g) => patch.group_level = Some((g, *level)),
                    None => patch.notification_level = Some(*level),
                }
                Effect::UpdateExisting(*topic_id, patch)
            }
            TrackingMessage::Delete { topic_id } | TrackingMessage::Destroy { topic_id } => {
                Effect::Remove(*topic_id)
            }
            TrackingMessage::Recover { topic_id, payload } => {
                Effect::UpdateExisting(*topic_id, base_patch(payload, group))
            }
        }
    }
}

/// Patch from the common payload fields. Levels seen on a group channel are
/// recorded against that group rather than as the topic's own level.
fn base_patch(payload: &TopicPayload, group: Option<GroupId>) -> TopicPatch {
    let mut patch = TopicPatch {
        category_id: payload.category_id,
        tags: payload.tags.as_ref().map(|t| t.iter().cloned().collect()),
        highest_post_number: payload.highest_post_number,
        last_read_post_number: payload.last_read_post_number,
        created_at: payload.created_at,
        ..TopicPatch::default()
    };

    if let Some(ids) = &payload.group_ids {
        patch.add_groups.extend(ids.iter().copied());
    }
    patch.add_groups.extend(group);

    match (payload.notification_level, group) {
        (Some(level), Some(g)) => patch.group_level = Some((g, level)),
        (Some(level), None) => patch.notification_level = Some(level),
        (None, _) => {}
    }

    patch
}
