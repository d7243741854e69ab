//! Read-only category tree and tag defaults.
//!
//! Categories are stored in an arena: each node records its parent as an
//! index, so subcategory rollups never chase pointers.

use crate::error::{Result, TrackerError};
use crate::types::{CategoryId, NotificationLevel};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Category metadata supplied by the category owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: CategoryId,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    /// Viewer's default notification level for topics in this category.
    #[serde(default)]
    pub notification_level: Option<NotificationLevel>,
}

impl CategoryInfo {
    pub fn root(id: u64) -> Self {
        Self {
            id: CategoryId(id),
            parent_id: None,
            notification_level: None,
        }
    }

    pub fn child(id: u64, parent: u64) -> Self {
        Self {
            id: CategoryId(id),
            parent_id: Some(CategoryId(parent)),
            notification_level: None,
        }
    }

    pub fn with_level(mut self, level: NotificationLevel) -> Self {
        self.notification_level = Some(level);
        self
    }
}

#[derive(Clone, Debug)]
struct CategoryNode {
    id: CategoryId,
    parent: Option<usize>,
    level: Option<NotificationLevel>,
}

/// Arena-backed category hierarchy.
#[derive(Clone, Debug, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    by_id: HashMap<CategoryId, usize>,
}

impl CategoryTree {
    /// Build a tree. Parents must be present in `categories`; order is free.
    pub fn new(categories: &[CategoryInfo]) -> Result<Self> {
        let mut tree = CategoryTree::default();

        for info in categories {
            let idx = tree.nodes.len();
            tree.nodes.push(CategoryNode {
                id: info.id,
                parent: None,
                level: info.notification_level,
            });
            tree.by_id.insert(info.id, idx);
        }

        for info in categories {
            let Some(parent_id) = info.parent_id else {
                continue;
            };
            let parent_idx = *tree
                .by_id
                .get(&parent_id)
                .ok_or(TrackerError::UnknownCategory(parent_id))?;
            let idx = tree.by_id[&info.id];
            tree.nodes[idx].parent = Some(parent_idx);
        }

        // Every walk to the root must terminate.
        for node in &tree.nodes {
            let mut seen = HashSet::new();
            let mut cursor = tree.by_id.get(&node.id).copied();
            while let Some(idx) = cursor {
                if !seen.insert(idx) {
                    return Err(TrackerError::CategoryCycle(node.id));
                }
                cursor = tree.nodes[idx].parent;
            }
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The category itself followed by its ancestors, nearest first.
    pub fn ancestors(&self, id: CategoryId) -> impl Iterator<Item = CategoryId> + '_ {
        let mut cursor = self.by_id.get(&id).copied();
        let unknown = if cursor.is_none() { Some(id) } else { None };
        unknown.into_iter().chain(std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.nodes[idx].parent;
            Some(self.nodes[idx].id)
        }))
    }

    /// True if `id` is `root` or any descendant of `root`.
    pub fn is_within(&self, id: CategoryId, root: CategoryId) -> bool {
        self.ancestors(id).any(|a| a == root)
    }

    /// Default level from the nearest category in the ancestry that sets one.
    pub fn default_level(&self, id: CategoryId) -> Option<NotificationLevel> {
        self.ancestors(id)
            .filter_map(|a| self.by_id.get(&a))
            .find_map(|&idx| self.nodes[idx].level)
    }
}

/// Per-tag default notification levels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagLevels(HashMap<String, NotificationLevel>);

impl TagLevels {
    pub fn new(levels: HashMap<String, NotificationLevel>) -> Self {
        Self(levels)
    }

    pub fn get(&self, tag: &str) -> Option<NotificationLevel> {
        self.0.get(tag).copied()
    }

    pub fn set(&mut self, tag: impl Into<String>, level: NotificationLevel) {
        self.0.insert(tag.into(), level);
    }

    /// Most attentive default across `tags`.
    pub fn max_level<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> Option<NotificationLevel> {
        tags.into_iter().filter_map(|t| self.get(t)).max()
    }
}
