//! Viewer preferences supplied by the profile/settings owner.

use crate::types::{CategoryId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Read-only inputs to classification and presentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerPreferences {
    /// `sidebar_show_count_of_new_items`: badge shows a number instead of a dot.
    pub show_count_of_new_items: bool,

    /// `sidebar_link_to_filtered_list`: links go to the unread/new list.
    pub link_to_filtered_list: bool,

    /// Topics created before this are never new.
    pub treat_as_new_topic_start_date: Timestamp,

    pub muted_category_ids: BTreeSet<CategoryId>,

    pub muted_tags: BTreeSet<String>,
}

impl Default for ViewerPreferences {
    fn default() -> Self {
        Self {
            show_count_of_new_items: false,
            link_to_filtered_list: true,
            treat_as_new_topic_start_date: Timestamp(0),
            muted_category_ids: BTreeSet::new(),
            muted_tags: BTreeSet::new(),
        }
    }
}
