use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OwnerId, ReminderKind, TimeOfDay, Weekday};

mod channels;
mod schedule_store;

pub use channels::Channel;
pub use schedule_store::{ScheduleMutation, ScheduleStore, StoreError};

/// Lead times used when a schedule is created without explicit ones.
pub const DEFAULT_LEAD_TIMES: [u32; 3] = [60, 30, 5];

/// A persisted schedule. Field names on disk follow the legacy JSON layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner: OwnerId,
    pub title: String,
    #[serde(rename = "time")]
    pub time_of_day: TimeOfDay,
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub note: String,
    #[serde(rename = "reminder_type")]
    pub kind: ReminderKind,
    #[serde(rename = "reminder_times")]
    pub lead_times: Vec<u32>,
    /// Only meaningful for `ReminderKind::Once`.
    #[serde(rename = "reminder_sent", default)]
    pub sent_marks: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Key into `sent_marks` for one lead time.
    pub fn sent_key(&self, lead_time: u32) -> String {
        format!("{}_{}m", self.id, lead_time)
    }

    pub fn is_sent(&self, lead_time: u32) -> bool {
        self.sent_marks
            .get(&self.sent_key(lead_time))
            .copied()
            .unwrap_or(false)
    }

    pub fn mark_sent(&mut self, lead_time: u32) {
        let key = self.sent_key(lead_time);
        self.sent_marks.insert(key, true);
    }

    /// True once every lead time of a one-shot schedule has fired.
    pub fn all_sent(&self) -> bool {
        !self.lead_times.is_empty() && self.lead_times.iter().all(|&lt| self.is_sent(lt))
    }
}

/// Input for `ScheduleStore::create`. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSchedule {
    pub owner: OwnerId,
    pub title: String,
    pub time_of_day: TimeOfDay,
    pub days: Vec<Weekday>,
    pub note: String,
    pub kind: ReminderKind,
    pub lead_times: Vec<u32>,
}
