//! Agenda items shown on the attendee schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AgendaItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    // Rows predating the column are active
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl AgendaItem {
    /// Whether the item is running at `now`. Items without times never are.
    pub fn is_happening_at(&self, now: DateTime<Utc>) -> bool {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => start <= now && now < end,
            _ => false,
        }
    }

    pub fn location_display(&self) -> &str {
        self.location.as_deref().unwrap_or("TBA")
    }
}

/// Order by explicit sort order, then start time, then title.
pub fn sort_agenda(items: &mut [AgendaItem]) {
    items.sort_by(|a, b| {
        a.sort_order
            .unwrap_or(i32::MAX)
            .cmp(&b.sort_order.unwrap_or(i32::MAX))
            .then_with(|| a.start_time.cmp(&b.start_time))
            .then_with(|| a.title.cmp(&b.title))
    });
}
