use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::conversation::ScheduleChange;
use crate::cron_utils::{compute_next_run_local, lead_time_fire_at, FireTime};
use crate::traits::{Channel, Schedule, ScheduleMutation, ScheduleStore, StoreError};
use crate::types::{OutgoingMessage, ReminderKind, Weekday};

/// One weekly firing: a lead time of a schedule on one of its days.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerDescriptor {
    pub schedule_id: String,
    pub weekday: Weekday,
    pub lead_time: u32,
}

/// What a single firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The schedule was deleted; nothing to do.
    Missing,
    /// A one-shot lead time that already fired.
    AlreadySent,
    Fired {
        delivered: bool,
        /// The one-shot schedule has fired every lead time and was removed.
        retired: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    fire: FireTime,
    next: DateTime<Local>,
}

pub struct ReminderScheduler {
    store: Arc<dyn ScheduleStore>,
    channel: Arc<dyn Channel>,
    triggers: Mutex<HashMap<TriggerDescriptor, Armed>>,
    /// Serializes firings of the same schedule.
    firing_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tick_interval: Duration,
    persist_retries: u32,
    retry_backoff: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        channel: Arc<dyn Channel>,
        tick_interval_secs: u64,
        persist_retries: u32,
    ) -> Self {
        Self {
            store,
            channel,
            triggers: Mutex::new(HashMap::new()),
            firing_locks: Mutex::new(HashMap::new()),
            tick_interval: Duration::from_secs(tick_interval_secs),
            persist_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }

    #[cfg(test)]
    fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Register every persisted schedule. Called once at startup.
    pub async fn sync_all(&self) -> usize {
        let schedules = self.store.list_all().await;
        let mut total = 0;
        for schedule in &schedules {
            match self.register(schedule).await {
                Ok(n) => total += n,
                Err(e) => error!(schedule_id = %schedule.id, "Failed to register schedule: {}", e),
            }
        }
        info!(
            schedules = schedules.len(),
            triggers = total,
            "Registered persisted schedules"
        );
        total
    }

    /// Replace all triggers of `schedule` with ones matching its current
    /// time, days and lead times. Returns the number registered.
    pub async fn register(&self, schedule: &Schedule) -> anyhow::Result<usize> {
        let now = Local::now();
        let mut fresh = Vec::new();
        for &weekday in &schedule.days {
            for &lead_time in &schedule.lead_times {
                if schedule.kind == ReminderKind::Once && schedule.is_sent(lead_time) {
                    continue;
                }
                let fire = lead_time_fire_at(schedule.time_of_day, weekday, lead_time);
                let next = compute_next_run_local(&fire.cron_expr(), &now)?;
                fresh.push((
                    TriggerDescriptor {
                        schedule_id: schedule.id.clone(),
                        weekday,
                        lead_time,
                    },
                    Armed { fire, next },
                ));
            }
        }

        let count = fresh.len();
        let mut triggers = self.triggers.lock().await;
        triggers.retain(|t, _| t.schedule_id != schedule.id);
        triggers.extend(fresh);
        debug!(schedule_id = %schedule.id, triggers = count, "Registered triggers");
        Ok(count)
    }

    /// Remove every trigger of a schedule.
    pub async fn deregister(&self, schedule_id: &str) {
        self.triggers
            .lock()
            .await
            .retain(|t, _| t.schedule_id != schedule_id);
        self.firing_locks.lock().await.remove(schedule_id);
        debug!(schedule_id = %schedule_id, "Deregistered triggers");
    }

    /// Mirror a committed store change.
    pub async fn apply(&self, change: &ScheduleChange) {
        match change {
            ScheduleChange::Created(s) | ScheduleChange::Updated(s) => {
                if let Err(e) = self.register(s).await {
                    error!(schedule_id = %s.id, "Failed to register schedule: {}", e);
                }
            }
            ScheduleChange::Deleted(id) => self.deregister(id).await,
        }
    }

    /// Registered triggers of one schedule with their next fire instant.
    #[cfg(test)]
    pub async fn triggers_for(&self, schedule_id: &str) -> Vec<(TriggerDescriptor, DateTime<Local>)> {
        let mut found: Vec<_> = self
            .triggers
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t.schedule_id == schedule_id)
            .map(|(t, armed)| (t.clone(), armed.next))
            .collect();
        found.sort_by_key(|(_, at)| *at);
        found
    }

    /// Spawn the tick loop as a background task.
    pub fn spawn(self: Arc<Self>) {
        let interval = self.tick_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.tick_interval).await;
                for trigger in self.take_due(Local::now()).await {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.run_trigger(trigger).await;
                    });
                }
            }
        });

        info!(interval = ?interval, "Reminder scheduler spawned");
    }

    /// Collect triggers due at `now` and advance each to its next weekly
    /// occurrence after `now`.
    async fn take_due(&self, now: DateTime<Local>) -> Vec<TriggerDescriptor> {
        let mut triggers = self.triggers.lock().await;
        let mut due = Vec::new();
        triggers.retain(|trigger, armed| {
            if armed.next > now {
                return true;
            }
            due.push(trigger.clone());
            match compute_next_run_local(&armed.fire.cron_expr(), &now) {
                Ok(next) => {
                    armed.next = next;
                    true
                }
                Err(e) => {
                    error!(schedule_id = %trigger.schedule_id, "Dropping trigger: {}", e);
                    false
                }
            }
        });
        due
    }

    async fn run_trigger(&self, trigger: TriggerDescriptor) {
        match self.fire(&trigger).await {
            Ok(FireOutcome::Fired { retired: true, .. }) => {
                info!(schedule_id = %trigger.schedule_id, "One-shot schedule retired");
            }
            Ok(FireOutcome::Missing) => self.deregister(&trigger.schedule_id).await,
            Ok(_) => {}
            Err(e) => error!(
                schedule_id = %trigger.schedule_id,
                lead_time = trigger.lead_time,
                "Reminder firing failed: {}",
                e
            ),
        }
    }

    async fn firing_lock(&self, schedule_id: &str) -> Arc<Mutex<()>> {
        self.firing_locks
            .lock()
            .await
            .entry(schedule_id.to_string())
            .or_default()
            .clone()
    }

    /// Fire one trigger: re-read, decide, deliver, record.
    pub async fn fire(&self, trigger: &TriggerDescriptor) -> anyhow::Result<FireOutcome> {
        let lock = self.firing_lock(&trigger.schedule_id).await;
        let _guard = lock.lock().await;

        let schedule = match self.store.get(&trigger.schedule_id).await {
            Ok(s) => s,
            Err(StoreError::NotFound) => return Ok(FireOutcome::Missing),
            Err(e) => anyhow::bail!("Failed to load schedule {}: {}", trigger.schedule_id, e),
        };

        if schedule.kind == ReminderKind::Once && schedule.is_sent(trigger.lead_time) {
            debug!(schedule_id = %schedule.id, lead_time = trigger.lead_time, "Lead time already sent");
            return Ok(FireOutcome::AlreadySent);
        }

        let message = OutgoingMessage::reply(reminder_text(&schedule, trigger.lead_time));
        let delivered = match self.channel.send(schedule.owner, &message).await {
            Ok(()) => {
                info!(
                    channel = %self.channel.name(),
                    owner = %schedule.owner,
                    schedule_id = %schedule.id,
                    lead_time = trigger.lead_time,
                    "Reminder delivered"
                );
                true
            }
            Err(e) => {
                warn!(
                    channel = %self.channel.name(),
                    owner = %schedule.owner,
                    schedule_id = %schedule.id,
                    lead_time = trigger.lead_time,
                    "Reminder delivery failed: {}",
                    e
                );
                false
            }
        };

        if schedule.kind == ReminderKind::Recurring {
            return Ok(FireOutcome::Fired {
                delivered,
                retired: false,
            });
        }

        let Some(updated) = self.persist_sent(&schedule.id, trigger.lead_time).await? else {
            return Ok(FireOutcome::Missing);
        };
        self.triggers.lock().await.remove(trigger);

        let retired = if updated.all_sent() {
            self.retire(&updated.id).await?;
            true
        } else {
            false
        };

        Ok(FireOutcome::Fired { delivered, retired })
    }

    /// Mark `lead_time` sent on the stored record and persist, retrying
    /// transient failures. Nothing else of the record is written, so an edit
    /// committed while the reminder was in flight is kept.
    /// `None` if the schedule disappeared in the meantime.
    async fn persist_sent(&self, schedule_id: &str, lead_time: u32) -> anyhow::Result<Option<Schedule>> {
        let mut attempt = 0;
        loop {
            let mark: ScheduleMutation = Box::new(move |s: &mut Schedule| {
                s.mark_sent(lead_time);
                Ok(())
            });
            match self.store.modify(schedule_id, mark).await {
                Ok(updated) => return Ok(Some(updated)),
                Err(StoreError::NotFound) => return Ok(None),
                Err(e) if attempt < self.persist_retries => {
                    attempt += 1;
                    warn!(
                        schedule_id = %schedule_id,
                        lead_time,
                        attempt,
                        "Failed to persist sent mark, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    anyhow::bail!(
                        "Failed to persist sent mark for {} after {} attempts: {}",
                        schedule_id,
                        attempt + 1,
                        e
                    )
                }
            }
        }
    }

    /// Delete a one-shot schedule whose lead times have all fired.
    async fn retire(&self, schedule_id: &str) -> anyhow::Result<()> {
        let mut attempt = 0;
        loop {
            match self.store.delete(schedule_id).await {
                Ok(()) | Err(StoreError::NotFound) => break,
                Err(e) if attempt < self.persist_retries => {
                    attempt += 1;
                    warn!(schedule_id = %schedule_id, attempt, "Failed to retire schedule, retrying: {}", e);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => anyhow::bail!("Failed to retire schedule {}: {}", schedule_id, e),
            }
        }
        self.triggers
            .lock()
            .await
            .retain(|t, _| t.schedule_id != schedule_id);
        Ok(())
    }
}

/// Body of a reminder message.
pub fn reminder_text(schedule: &Schedule, lead_time: u32) -> String {
    let note = if schedule.note.is_empty() {
        "(no note)"
    } else {
        schedule.note.as_str()
    };
    format!(
        "⏰ Reminder, {} minutes before:\n📌 {}\n{}",
        lead_time, schedule.title, note
    )
}
