use std::fmt;

use async_trait::async_trait;

use crate::types::OwnerId;

use super::{NewSchedule, Schedule};

/// Failure of a store operation.
#[derive(Debug)]
pub enum StoreError {
    /// Another live schedule of the same owner already uses this title.
    DuplicateTitle(String),
    NotFound,
    /// The record would break a schedule invariant (empty title, days, ...).
    Invalid(&'static str),
    /// The collection could not be written (or read) durably.
    Persistence(anyhow::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateTitle(title) => write!(f, "title '{}' already exists", title),
            StoreError::NotFound => write!(f, "schedule not found"),
            StoreError::Invalid(reason) => write!(f, "invalid schedule: {}", reason),
            StoreError::Persistence(e) => write!(f, "persistence failure: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Persistence(e) => Some(&**e),
            _ => None,
        }
    }
}

/// In-place change to the current copy of a schedule, run by
/// [`ScheduleStore::modify`] while no other mutation can interleave.
pub type ScheduleMutation = Box<dyn FnOnce(&mut Schedule) -> Result<(), StoreError> + Send>;

/// Durable collection of schedules.
///
/// All mutations are serialized and persisted before they return `Ok`.
/// A failed mutation leaves both the in-memory view and the durable copy
/// at their last consistent state.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Insert a new schedule; rejects a duplicate (owner, title).
    async fn create(&self, schedule: NewSchedule) -> Result<Schedule, StoreError>;

    async fn get(&self, id: &str) -> Result<Schedule, StoreError>;

    async fn get_by_title(&self, owner: OwnerId, title: &str) -> Result<Schedule, StoreError>;

    /// All schedules of `owner`, oldest first.
    async fn list_by_owner(&self, owner: OwnerId) -> Vec<Schedule>;

    /// Every live schedule, oldest first.
    async fn list_all(&self) -> Vec<Schedule>;

    /// Full-record replace. Bumps `updated_at` and returns the stored record.
    /// Rejects a rename onto another schedule's title.
    async fn update(&self, schedule: Schedule) -> Result<Schedule, StoreError>;

    /// Atomic read-modify-write: `change` sees the stored record and the
    /// result is validated and persisted before any other mutation runs.
    /// Use this instead of `get` + `update` whenever the write must not
    /// clobber fields changed concurrently.
    async fn modify(&self, id: &str, change: ScheduleMutation) -> Result<Schedule, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn title_exists(&self, owner: OwnerId, title: &str) -> bool;
}
