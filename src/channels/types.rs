//! Channel descriptors and inbound message types.

use crate::error::{Result, TrackerError};
use crate::types::{CategoryId, GroupId, NotificationLevel, Timestamp, TopicId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

const USER_PREFIX: &str = "/topic-tracking/user/";
const GROUP_PREFIX: &str = "/topic-tracking/group/";

/// A publish/subscribe destination the engine listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelDescriptor {
    /// Events addressed to the viewer.
    PerUser(UserId),
    /// Events for a group inbox the viewer belongs to.
    PerGroup(GroupId),
}

impl ChannelDescriptor {
    pub fn name(&self) -> String {
        match self {
            ChannelDescriptor::PerUser(user) => format!("{}{}", USER_PREFIX, user.0),
            ChannelDescriptor::PerGroup(group) => format!("{}{}", GROUP_PREFIX, group.0),
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let unknown = || TrackerError::UnknownChannel(name.to_string());
        if let Some(rest) = name.strip_prefix(USER_PREFIX) {
            let id = rest.parse().map_err(|_| unknown())?;
            Ok(ChannelDescriptor::PerUser(UserId(id)))
        } else if let Some(rest) = name.strip_prefix(GROUP_PREFIX) {
            let id = rest.parse().map_err(|_| unknown())?;
            Ok(ChannelDescriptor::PerGroup(GroupId(id)))
        } else {
            Err(unknown())
        }
    }

    /// Group this channel tags its events with, if any.
    pub fn group(&self) -> Option<GroupId> {
        match self {
            ChannelDescriptor::PerGroup(group) => Some(*group),
            ChannelDescriptor::PerUser(_) => None,
        }
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A message as delivered by the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    /// Bus-assigned id, increasing per channel.
    pub message_id: i64,
    /// `{ "message_type": ..., "topic_id": ..., "payload": {...} }`
    pub data: serde_json::Value,
}

impl ChannelMessage {
    pub fn new(channel: &ChannelDescriptor, message_id: i64, data: serde_json::Value) -> Self {
        Self {
            channel: channel.name(),
            message_id,
            data,
        }
    }
}

/// Topic fields carried by update-style messages. Unknown fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TopicPayload {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub group_ids: Option<Vec<GroupId>>,
    #[serde(default)]
    pub highest_post_number: Option<u32>,
    #[serde(default)]
    pub last_read_post_number: Option<u32>,
    #[serde(default)]
    pub notification_level: Option<NotificationLevel>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

/// Decoded inbound event, one variant per message type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackingMessage {
    NewTopic { topic_id: TopicId, payload: TopicPayload },
    Latest { topic_id: TopicId, payload: TopicPayload },
    Unread { topic_id: TopicId, payload: TopicPayload },
    Read { topic_id: TopicId, payload: TopicPayload },
    GroupArchive {
        topic_id: TopicId,
        acting_user_id: UserId,
        group_ids: Vec<GroupId>,
    },
    DismissNew { topic_ids: Vec<TopicId> },
    NotificationLevelChange {
        topic_id: TopicId,
        level: NotificationLevel,
    },
    Delete { topic_id: TopicId },
    Destroy { topic_id: TopicId },
    Recover { topic_id: TopicId, payload: TopicPayload },
}

#[derive(Deserialize)]
struct Envelope {
    message_type: String,
    #[serde(default)]
    topic_id: Option<TopicId>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GroupArchivePayload {
    #[serde(default)]
    acting_user_id: Option<UserId>,
    #[serde(default)]
    group_ids: Vec<GroupId>,
}

#[derive(Deserialize)]
struct DismissNewPayload {
    #[serde(default)]
    topic_ids: Option<Vec<TopicId>>,
}

impl TrackingMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            TrackingMessage::NewTopic { .. } => "new_topic",
            TrackingMessage::Latest { .. } => "latest",
            TrackingMessage::Unread { .. } => "unread",
            TrackingMessage::Read { .. } => "read",
            TrackingMessage::GroupArchive { .. } => "group_archive",
            TrackingMessage::DismissNew { .. } => "dismiss_new",
            TrackingMessage::NotificationLevelChange { .. } => "notification_level_change",
            TrackingMessage::Delete { .. } => "delete",
            TrackingMessage::Destroy { .. } => "destroy",
            TrackingMessage::Recover { .. } => "recover",
        }
    }

    /// Decode a message body. Fails on unknown types or missing required
    /// fields; never partially applies anything.
    pub fn decode(data: &serde_json::Value) -> Result<Self> {
        let envelope = Envelope::deserialize(data).map_err(|e| TrackerError::Decode(e.to_string()))?;
        let message_type = envelope.message_type.as_str();
        let payload = envelope
            .payload
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        let missing = |field: &'static str| TrackerError::MissingField {
            message_type: envelope.message_type.clone(),
            field,
        };
        let topic_id = || envelope.topic_id.ok_or_else(|| missing("topic_id"));
        let topic_payload = || {
            TopicPayload::deserialize(&payload).map_err(|e| TrackerError::Decode(e.to_string()))
        };

        let message = match message_type {
            "new_topic" => {
                let payload = topic_payload()?;
                if payload.highest_post_number.is_none() {
                    return Err(missing("highest_post_number"));
                }
                TrackingMessage::NewTopic {
                    topic_id: topic_id()?,
                    payload,
                }
            }
            "latest" => TrackingMessage::Latest {
                topic_id: topic_id()?,
                payload: topic_payload()?,
            },
            "unread" | "read" => {
                let payload = topic_payload()?;
                if payload.highest_post_number.is_none() {
                    return Err(missing("highest_post_number"));
                }
                if payload.last_read_post_number.is_none() {
                    return Err(missing("last_read_post_number"));
                }
                let topic_id = topic_id()?;
                if message_type == "unread" {
                    TrackingMessage::Unread { topic_id, payload }
                } else {
                    TrackingMessage::Read { topic_id, payload }
                }
            }
            "group_archive" => {
                let archive = GroupArchivePayload::deserialize(&payload)
                    .map_err(|e| TrackerError::Decode(e.to_string()))?;
                TrackingMessage::GroupArchive {
                    topic_id: topic_id()?,
                    acting_user_id: archive.acting_user_id.ok_or_else(|| missing("acting_user_id"))?,
                    group_ids: archive.group_ids,
                }
            }
            "dismiss_new" => {
                let dismiss = DismissNewPayload::deserialize(&payload)
                    .map_err(|e| TrackerError::Decode(e.to_string()))?;
                TrackingMessage::DismissNew {
                    topic_ids: dismiss.topic_ids.ok_or_else(|| missing("topic_ids"))?,
                }
            }
            "notification_level_change" => {
                let payload = topic_payload()?;
                TrackingMessage::NotificationLevelChange {
                    topic_id: topic_id()?,
                    level: payload
                        .notification_level
                        .ok_or_else(|| missing("notification_level"))?,
                }
            }
            "delete" => TrackingMessage::Delete {
                topic_id: topic_id()?,
            },
            "destroy" => TrackingMessage::Destroy {
                topic_id: topic_id()?,
            },
            "recover" => TrackingMessage::Recover {
                topic_id: topic_id()?,
                payload: topic_payload()?,
            },
            other => return Err(TrackerError::UnknownMessageType(other.to_string())),
        };

        Ok(message)
    }
}
