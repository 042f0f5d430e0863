//! File-backed schedule store.
//!
//! The whole collection lives in memory behind a `RwLock` and is rewritten to
//! a single JSON document on every mutation. Writes go to a sibling temp file
//! which is then renamed over the target, so a crash or I/O error never leaves
//! a half-written file behind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::traits::{NewSchedule, Schedule, ScheduleMutation, ScheduleStore, StoreError};
use crate::types::{OwnerId, Weekday};

pub struct JsonScheduleStore {
    path: PathBuf,
    schedules: RwLock<HashMap<String, Schedule>>,
}

impl JsonScheduleStore {
    /// Open (or initialise) the store at `path`, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow::anyhow!("Failed to create directory {}: {}", parent.display(), e)
                })?;
            }
        }

        let schedules = load_file(&path).await?;
        info!(path = %path.display(), count = schedules.len(), "Schedule store loaded");

        Ok(Self {
            path,
            schedules: RwLock::new(schedules),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `snapshot` and atomically replace the file.
    async fn persist(&self, snapshot: &HashMap<String, Schedule>) -> anyhow::Result<()> {
        // Sorted by id so the file diffs cleanly between saves.
        let ordered: BTreeMap<&String, &Schedule> = snapshot.iter().collect();
        let data = serde_json::to_vec_pretty(&ordered)
            .map_err(|e| anyhow::anyhow!("Failed to serialize schedules: {}", e))?;

        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, &data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", tmp_path.display(), e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            anyhow::bail!("Failed to replace {}: {}", self.path.display(), e);
        }
        Ok(())
    }

    /// Replace the stored copy of `schedule` while the caller holds the write
    /// lock. Owner, kind, lead times and creation time are fixed for a
    /// schedule's lifetime; the stored values win over whatever was passed.
    async fn commit(
        &self,
        schedules: &mut HashMap<String, Schedule>,
        mut schedule: Schedule,
    ) -> Result<Schedule, StoreError> {
        normalize_days(&mut schedule.days);

        let existing = schedules.get(&schedule.id).ok_or(StoreError::NotFound)?;
        schedule.owner = existing.owner;
        schedule.kind = existing.kind;
        schedule.lead_times = existing.lead_times.clone();
        schedule.created_at = existing.created_at;
        validate(&schedule.title, &schedule.days, &schedule.lead_times)?;

        if title_taken(schedules, schedule.owner, &schedule.title, Some(&schedule.id)) {
            return Err(StoreError::DuplicateTitle(schedule.title));
        }

        schedule.updated_at = Utc::now();
        let previous = schedules.insert(schedule.id.clone(), schedule.clone());
        if let Err(e) = self.persist(schedules).await {
            if let Some(previous) = previous {
                schedules.insert(previous.id.clone(), previous);
            }
            warn!(schedule_id = %schedule.id, "Failed to persist schedule update: {}", e);
            return Err(StoreError::Persistence(e));
        }

        info!(schedule_id = %schedule.id, "Schedule updated");
        Ok(schedule)
    }
}

async fn load_file(path: &Path) -> anyhow::Result<HashMap<String, Schedule>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => anyhow::bail!("Failed to read {}: {}", path.display(), e),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "schedules.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Sorted, duplicate-free day set.
fn normalize_days(days: &mut Vec<Weekday>) {
    days.sort();
    days.dedup();
}

fn validate(title: &str, days: &[Weekday], lead_times: &[u32]) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::Invalid("title must not be empty"));
    }
    if days.is_empty() {
        return Err(StoreError::Invalid("at least one day is required"));
    }
    if lead_times.is_empty() || lead_times.contains(&0) {
        return Err(StoreError::Invalid("lead times must be positive and non-empty"));
    }
    Ok(())
}

fn title_taken(
    schedules: &HashMap<String, Schedule>,
    owner: OwnerId,
    title: &str,
    except_id: Option<&str>,
) -> bool {
    schedules.values().any(|s| {
        s.owner == owner && s.title == title && Some(s.id.as_str()) != except_id
    })
}

fn sorted(mut schedules: Vec<Schedule>) -> Vec<Schedule> {
    schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    schedules
}

#[async_trait]
impl ScheduleStore for JsonScheduleStore {
    async fn create(&self, new: NewSchedule) -> Result<Schedule, StoreError> {
        let NewSchedule {
            owner,
            title,
            time_of_day,
            mut days,
            note,
            kind,
            mut lead_times,
        } = new;
        normalize_days(&mut days);
        let mut seen = HashSet::new();
        lead_times.retain(|lt| seen.insert(*lt));
        validate(&title, &days, &lead_times)?;

        let mut schedules = self.schedules.write().await;
        if title_taken(&schedules, owner, &title, None) {
            return Err(StoreError::DuplicateTitle(title));
        }

        let now = Utc::now();
        let schedule = Schedule {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            title,
            time_of_day,
            days,
            note,
            kind,
            lead_times,
            sent_marks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };

        schedules.insert(schedule.id.clone(), schedule.clone());
        if let Err(e) = self.persist(&schedules).await {
            schedules.remove(&schedule.id);
            warn!(owner = %owner, "Failed to persist new schedule: {}", e);
            return Err(StoreError::Persistence(e));
        }

        info!(owner = %owner, schedule_id = %schedule.id, title = %schedule.title, "Schedule created");
        Ok(schedule)
    }

    async fn get(&self, id: &str) -> Result<Schedule, StoreError> {
        self.schedules
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_title(&self, owner: OwnerId, title: &str) -> Result<Schedule, StoreError> {
        self.schedules
            .read()
            .await
            .values()
            .find(|s| s.owner == owner && s.title == title)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Vec<Schedule> {
        let schedules = self.schedules.read().await;
        sorted(
            schedules
                .values()
                .filter(|s| s.owner == owner)
                .cloned()
                .collect(),
        )
    }

    async fn list_all(&self) -> Vec<Schedule> {
        let schedules = self.schedules.read().await;
        sorted(schedules.values().cloned().collect())
    }

    async fn update(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        let mut schedules = self.schedules.write().await;
        self.commit(&mut schedules, schedule).await
    }

    async fn modify(&self, id: &str, change: ScheduleMutation) -> Result<Schedule, StoreError> {
        let mut schedules = self.schedules.write().await;
        let mut schedule = schedules.get(id).cloned().ok_or(StoreError::NotFound)?;
        change(&mut schedule)?;
        self.commit(&mut schedules, schedule).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut schedules = self.schedules.write().await;
        let removed = schedules.remove(id).ok_or(StoreError::NotFound)?;
        if let Err(e) = self.persist(&schedules).await {
            schedules.insert(removed.id.clone(), removed);
            warn!(schedule_id = %id, "Failed to persist schedule deletion: {}", e);
            return Err(StoreError::Persistence(e));
        }

        info!(schedule_id = %id, owner = %removed.owner, "Schedule deleted");
        Ok(())
    }

    async fn title_exists(&self, owner: OwnerId, title: &str) -> bool {
        title_taken(&*self.schedules.read().await, owner, title, None)
    }
}
