//! Core types for the tracking engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a discussion topic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub u64);

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId({})", self.0)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a category.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u64);

impl fmt::Debug for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategoryId({})", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a group (group inbox).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user (the viewer or an acting user).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// How closely the viewer follows a topic.
///
/// Ordered from least to most attentive, so `level >= Tracking` is the
/// "counts as unread" test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "LevelRepr", into = "u8")]
pub enum NotificationLevel {
    Muted,
    Regular,
    Tracking,
    Watching,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Muted => "muted",
            NotificationLevel::Regular => "regular",
            NotificationLevel::Tracking => "tracking",
            NotificationLevel::Watching => "watching",
        }
    }

    /// Tracking or watching.
    pub fn is_tracked(&self) -> bool {
        *self >= NotificationLevel::Tracking
    }
}

impl Default for NotificationLevel {
    fn default() -> Self {
        NotificationLevel::Regular
    }
}

impl From<NotificationLevel> for u8 {
    fn from(level: NotificationLevel) -> u8 {
        match level {
            NotificationLevel::Muted => 0,
            NotificationLevel::Regular => 1,
            NotificationLevel::Tracking => 2,
            NotificationLevel::Watching => 3,
        }
    }
}

impl TryFrom<u8> for NotificationLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NotificationLevel::Muted),
            1 => Ok(NotificationLevel::Regular),
            2 => Ok(NotificationLevel::Tracking),
            3 => Ok(NotificationLevel::Watching),
            other => Err(format!("notification level out of range: {}", other)),
        }
    }
}

impl std::str::FromStr for NotificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "muted" => Ok(NotificationLevel::Muted),
            "regular" => Ok(NotificationLevel::Regular),
            "tracking" => Ok(NotificationLevel::Tracking),
            "watching" => Ok(NotificationLevel::Watching),
            other => Err(format!("unknown notification level: {}", other)),
        }
    }
}

/// Wire form of a notification level: integer or lowercase name.
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Number(u8),
    Name(String),
}

impl TryFrom<LevelRepr> for NotificationLevel {
    type Error = String;

    fn try_from(repr: LevelRepr) -> Result<Self, Self::Error> {
        match repr {
            LevelRepr::Number(n) => NotificationLevel::try_from(n),
            LevelRepr::Name(name) => name.parse(),
        }
    }
}

/// Per-topic tracking record. One per topic currently known to the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicState {
    pub topic_id: TopicId,

    #[serde(default)]
    pub category_id: Option<CategoryId>,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Groups through which this topic is reachable as a group inbox message.
    #[serde(default)]
    pub group_ids: BTreeSet<GroupId>,

    pub highest_post_number: u32,

    /// `None` means the viewer never opened the topic.
    #[serde(default)]
    pub last_read_post_number: Option<u32>,

    /// Explicit topic-level setting. `None` behaves as regular unless a
    /// category, tag or group default says otherwise.
    #[serde(default)]
    pub notification_level: Option<NotificationLevel>,

    /// Levels observed on group channels, keyed by the delivering group.
    #[serde(default)]
    pub group_levels: BTreeMap<GroupId, NotificationLevel>,

    /// `None` until stated by the server or derived from the viewer cutoff
    /// on load.
    #[serde(default)]
    pub created_in_new_period: Option<bool>,

    #[serde(default)]
    pub created_at: Option<Timestamp>,

    /// Viewer cutoff in effect when this record was loaded.
    #[serde(default)]
    pub treat_as_new_topic_start_date: Timestamp,
}

impl TopicState {
    /// Create a bare record with a single post and nothing read.
    pub fn new(topic_id: TopicId, highest_post_number: u32) -> Self {
        Self {
            topic_id,
            category_id: None,
            tags: BTreeSet::new(),
            group_ids: BTreeSet::new(),
            highest_post_number: highest_post_number.max(1),
            last_read_post_number: None,
            notification_level: None,
            group_levels: BTreeMap::new(),
            created_in_new_period: None,
            created_at: None,
            treat_as_new_topic_start_date: Timestamp::default(),
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.group_ids = groups.into_iter().collect();
        self
    }

    pub fn with_last_read(mut self, post_number: u32) -> Self {
        self.last_read_post_number = Some(post_number.min(self.highest_post_number));
        self
    }

    pub fn with_level(mut self, level: NotificationLevel) -> Self {
        self.notification_level = Some(level);
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn created_in_new_period(mut self, value: bool) -> Self {
        self.created_in_new_period = Some(value);
        self
    }

    /// Whether the topic was created within the viewer's new-topic window.
    pub fn in_new_period(&self) -> bool {
        self.created_in_new_period == Some(true)
    }

    /// Scope membership keys of this record.
    pub fn keys(&self) -> ScopeKeys {
        ScopeKeys {
            category_id: self.category_id,
            tags: self.tags.clone(),
            group_ids: self.group_ids.clone(),
        }
    }
}

/// The fields of a record that decide which scopes it belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeKeys {
    pub category_id: Option<CategoryId>,
    pub tags: BTreeSet<String>,
    pub group_ids: BTreeSet<GroupId>,
}

/// Aggregate counts for one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub unread: usize,
    pub new: usize,
}

impl Counts {
    pub fn is_zero(&self) -> bool {
        self.unread == 0 && self.new == 0
    }
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, other: Counts) {
        self.unread += other.unread;
        self.new += other.new;
    }
}
