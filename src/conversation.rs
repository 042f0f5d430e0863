//! The guided add / edit / delete conversations.
//!
//! A conversation is a small state machine per owner. Every variant of
//! [`Conversation`] carries exactly the draft fields collected so far, so a
//! step can never read a field that has not been asked for yet. The engine
//! is transport-agnostic: it consumes the owner's text and returns the
//! replies to send, the next state and any change the scheduler must learn
//! about.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::formatting::describe_lead_times;
use crate::labels::Labels;
use crate::traits::{NewSchedule, Schedule, ScheduleMutation, ScheduleStore, StoreError};
use crate::types::{OutgoingMessage, OwnerId, ReminderKind, TimeOfDay, Weekday};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    AwaitingTitle,
    AwaitingTime {
        title: String,
    },
    AwaitingDays {
        title: String,
        time: TimeOfDay,
        selected: Vec<Weekday>,
    },
    AwaitingNote {
        title: String,
        time: TimeOfDay,
        days: Vec<Weekday>,
    },
    AwaitingKind {
        title: String,
        time: TimeOfDay,
        days: Vec<Weekday>,
        note: String,
    },
    AwaitingEditTarget,
    AwaitingEditField {
        id: String,
    },
    AwaitingEditValue {
        id: String,
        field: EditField,
    },
    AwaitingEditContinue {
        id: String,
    },
    AwaitingDeleteTarget,
}

/// Fields that can be changed after creation. Kind and lead times are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Time,
    Days,
    Note,
}

impl fmt::Display for EditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditField::Title => "Title",
            EditField::Time => "Time",
            EditField::Days => "Days",
            EditField::Note => "Note",
        })
    }
}

/// A committed store mutation the scheduler has to mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleChange {
    Created(Schedule),
    Updated(Schedule),
    Deleted(String),
}

/// Result of feeding one message into a conversation.
#[derive(Debug)]
pub struct StepOutcome {
    pub replies: Vec<OutgoingMessage>,
    /// State to keep for the owner; `None` ends the conversation.
    pub next: Option<Conversation>,
    pub change: Option<ScheduleChange>,
}

impl StepOutcome {
    fn stay(state: Conversation, replies: Vec<OutgoingMessage>) -> Self {
        Self {
            replies,
            next: Some(state),
            change: None,
        }
    }

    fn done(reply: OutgoingMessage) -> Self {
        Self {
            replies: vec![reply],
            next: None,
            change: None,
        }
    }
}

const GENERIC_FAILURE: &str = "⚠️ Something went wrong while saving. Please try again.";
const NOT_FOUND: &str = "❌ No schedule with that title was found.";

pub struct ConversationEngine {
    store: Arc<dyn ScheduleStore>,
    labels: &'static Labels,
    lead_times: Vec<u32>,
}

impl ConversationEngine {
    pub fn new(store: Arc<dyn ScheduleStore>, labels: &'static Labels, lead_times: Vec<u32>) -> Self {
        Self {
            store,
            labels,
            lead_times,
        }
    }

    pub fn labels(&self) -> &'static Labels {
        self.labels
    }

    /// Lead times given to every new schedule.
    pub fn lead_times(&self) -> &[u32] {
        &self.lead_times
    }

    pub fn begin_add(&self) -> StepOutcome {
        StepOutcome::stay(Conversation::AwaitingTitle, vec![self.title_prompt()])
    }

    pub fn begin_edit(&self) -> StepOutcome {
        StepOutcome::stay(
            Conversation::AwaitingEditTarget,
            vec![OutgoingMessage::with_keyboard(
                "Enter the title of the schedule to edit:",
                self.labels.cancel_keyboard(),
            )],
        )
    }

    pub fn begin_delete(&self) -> StepOutcome {
        StepOutcome::stay(
            Conversation::AwaitingDeleteTarget,
            vec![OutgoingMessage::with_keyboard(
                "Enter the title of the schedule to delete:",
                self.labels.cancel_keyboard(),
            )],
        )
    }

    /// Discard whatever the owner was doing.
    pub fn cancel(&self) -> StepOutcome {
        StepOutcome::done(OutgoingMessage::plain(
            "Cancelled. Type /help for help.",
        ))
    }

    /// Advance `state` with one message from `owner`.
    pub async fn step(&self, owner: OwnerId, state: Conversation, input: &str) -> StepOutcome {
        if self.labels.is_cancel(input) {
            info!(owner = %owner, "Conversation cancelled");
            return self.cancel();
        }

        match state {
            Conversation::AwaitingTitle => self.on_title(owner, input).await,
            Conversation::AwaitingTime { title } => self.on_time(title, input),
            Conversation::AwaitingDays {
                title,
                time,
                selected,
            } => self.on_day(title, time, selected, input),
            Conversation::AwaitingNote { title, time, days } => {
                self.on_note(title, time, days, input)
            }
            Conversation::AwaitingKind {
                title,
                time,
                days,
                note,
            } => self.on_kind(owner, title, time, days, note, input).await,
            Conversation::AwaitingEditTarget => self.on_edit_target(owner, input).await,
            Conversation::AwaitingEditField { id } => self.on_edit_field(id, input),
            Conversation::AwaitingEditValue { id, field } => {
                self.on_edit_value(owner, id, field, input).await
            }
            Conversation::AwaitingEditContinue { id } => self.on_edit_continue(id, input),
            Conversation::AwaitingDeleteTarget => self.on_delete_target(owner, input).await,
        }
    }

    // Prompts

    fn title_prompt(&self) -> OutgoingMessage {
        OutgoingMessage::with_keyboard("Enter a name for the schedule:", self.labels.cancel_keyboard())
    }

    fn time_prompt(&self) -> OutgoingMessage {
        OutgoingMessage::with_keyboard(
            "Pick a time (or type HH:MM):",
            self.labels.time_keyboard(),
        )
    }

    fn days_prompt(&self, text: impl Into<String>) -> OutgoingMessage {
        OutgoingMessage::with_keyboard(text, self.labels.days_keyboard())
    }

    fn note_prompt(&self) -> OutgoingMessage {
        OutgoingMessage::with_keyboard(
            "Enter a note (optional, or type '-'):",
            self.labels.note_keyboard(),
        )
    }

    fn kind_prompt(&self) -> OutgoingMessage {
        OutgoingMessage::with_keyboard("Pick the reminder type:", self.labels.kind_keyboard())
    }

    fn field_prompt(&self) -> OutgoingMessage {
        OutgoingMessage::with_keyboard(
            "Which field do you want to change?",
            self.labels.field_keyboard(),
        )
    }

    fn continue_prompt(&self) -> OutgoingMessage {
        OutgoingMessage::with_keyboard(
            "Edit another field?",
            self.labels.continue_keyboard(),
        )
    }

    fn value_prompt(&self, field: EditField) -> OutgoingMessage {
        match field {
            EditField::Title => OutgoingMessage::with_keyboard(
                "Enter the new title:",
                self.labels.cancel_keyboard(),
            ),
            EditField::Time => self.time_prompt(),
            EditField::Days => OutgoingMessage::with_keyboard(
                "Enter the new days, separated by commas (e.g. Monday, Thursday):",
                self.labels.day_list_keyboard(),
            ),
            EditField::Note => self.note_prompt(),
        }
    }

    fn day_names(&self, days: &[Weekday]) -> String {
        days.iter()
            .map(|&d| self.labels.weekday(d))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // Creation flow

    async fn on_title(&self, owner: OwnerId, input: &str) -> StepOutcome {
        let title = input.trim();
        if title.is_empty() {
            return StepOutcome::stay(
                Conversation::AwaitingTitle,
                vec![
                    OutgoingMessage::reply("The title cannot be empty."),
                    self.title_prompt(),
                ],
            );
        }
        if self.store.title_exists(owner, title).await {
            return StepOutcome::stay(
                Conversation::AwaitingTitle,
                vec![
                    OutgoingMessage::reply("❌ That title already exists. Use a different one."),
                    self.title_prompt(),
                ],
            );
        }
        StepOutcome::stay(
            Conversation::AwaitingTime {
                title: title.to_string(),
            },
            vec![self.time_prompt()],
        )
    }

    fn on_time(&self, title: String, input: &str) -> StepOutcome {
        match input.parse::<TimeOfDay>() {
            Ok(time) => StepOutcome::stay(
                Conversation::AwaitingDays {
                    title,
                    time,
                    selected: Vec::new(),
                },
                vec![self.days_prompt("Pick the days (one at a time), then press finish:")],
            ),
            Err(_) => StepOutcome::stay(
                Conversation::AwaitingTime { title },
                vec![OutgoingMessage::reply(
                    "Invalid time format. Use HH:MM (for example 09:30).",
                )],
            ),
        }
    }

    fn on_day(
        &self,
        title: String,
        time: TimeOfDay,
        mut selected: Vec<Weekday>,
        input: &str,
    ) -> StepOutcome {
        if self.labels.is_finish_days(input) {
            if selected.is_empty() {
                return StepOutcome::stay(
                    Conversation::AwaitingDays {
                        title,
                        time,
                        selected,
                    },
                    vec![
                        OutgoingMessage::reply("Pick at least one day!"),
                        self.days_prompt("Pick the days (one at a time), then press finish:"),
                    ],
                );
            }
            return StepOutcome::stay(
                Conversation::AwaitingNote {
                    title,
                    time,
                    days: selected,
                },
                vec![self.note_prompt()],
            );
        }

        let Some(day) = self.labels.parse_weekday(input) else {
            return StepOutcome::stay(
                Conversation::AwaitingDays {
                    title,
                    time,
                    selected,
                },
                vec![OutgoingMessage::reply(
                    "Unrecognized day. Pick one of the buttons.",
                )],
            );
        };

        if selected.contains(&day) {
            let replies = vec![
                OutgoingMessage::reply(format!(
                    "{} is already selected. Pick another day or press finish.",
                    self.labels.weekday(day)
                )),
                self.days_prompt(format!("Selected days: {}", self.day_names(&selected))),
            ];
            return StepOutcome::stay(
                Conversation::AwaitingDays {
                    title,
                    time,
                    selected,
                },
                replies,
            );
        }

        selected.push(day);
        let reply = self.days_prompt(format!(
            "✅ {} selected\n\nSelected days: {}",
            self.labels.weekday(day),
            self.day_names(&selected)
        ));
        StepOutcome::stay(
            Conversation::AwaitingDays {
                title,
                time,
                selected,
            },
            vec![reply],
        )
    }

    fn on_note(&self, title: String, time: TimeOfDay, days: Vec<Weekday>, input: &str) -> StepOutcome {
        let note = if self.labels.is_no_note(input) {
            String::new()
        } else {
            input.trim().to_string()
        };
        StepOutcome::stay(
            Conversation::AwaitingKind {
                title,
                time,
                days,
                note,
            },
            vec![self.kind_prompt()],
        )
    }

    async fn on_kind(
        &self,
        owner: OwnerId,
        title: String,
        time: TimeOfDay,
        days: Vec<Weekday>,
        note: String,
        input: &str,
    ) -> StepOutcome {
        let Some(kind) = self.labels.parse_kind(input) else {
            return StepOutcome::stay(
                Conversation::AwaitingKind {
                    title,
                    time,
                    days,
                    note,
                },
                vec![
                    OutgoingMessage::reply("Invalid choice. Pick one of the buttons."),
                    self.kind_prompt(),
                ],
            );
        };

        let new = NewSchedule {
            owner,
            title: title.clone(),
            time_of_day: time,
            days: days.clone(),
            note: note.clone(),
            kind,
            lead_times: self.lead_times.clone(),
        };

        match self.store.create(new).await {
            Ok(schedule) => {
                info!(owner = %owner, schedule_id = %schedule.id, title = %schedule.title, "Schedule created");
                let reply = OutgoingMessage::plain(format!(
                    "✅ Schedule added!\n📌 {}\n⏰ Reminder: {} ({} before the set time)",
                    schedule.title,
                    self.labels.kind(kind),
                    describe_lead_times(&schedule.lead_times)
                ));
                StepOutcome {
                    replies: vec![reply],
                    next: None,
                    change: Some(ScheduleChange::Created(schedule)),
                }
            }
            // Someone else claimed the title while the draft was open.
            Err(StoreError::DuplicateTitle(_)) => StepOutcome::stay(
                Conversation::AwaitingTitle,
                vec![
                    OutgoingMessage::reply("❌ That title already exists. Use a different one."),
                    self.title_prompt(),
                ],
            ),
            Err(e) => {
                warn!(owner = %owner, "Failed to create schedule: {}", e);
                StepOutcome::stay(
                    Conversation::AwaitingKind {
                        title,
                        time,
                        days,
                        note,
                    },
                    vec![OutgoingMessage::reply(GENERIC_FAILURE), self.kind_prompt()],
                )
            }
        }
    }

    // Edit flow

    async fn on_edit_target(&self, owner: OwnerId, input: &str) -> StepOutcome {
        match self.store.get_by_title(owner, input.trim()).await {
            Ok(schedule) => StepOutcome::stay(
                Conversation::AwaitingEditField { id: schedule.id },
                vec![self.field_prompt()],
            ),
            Err(_) => StepOutcome::done(OutgoingMessage::plain(NOT_FOUND)),
        }
    }

    fn on_edit_field(&self, id: String, input: &str) -> StepOutcome {
        match self.labels.parse_edit_field(input) {
            Some(field) => StepOutcome::stay(
                Conversation::AwaitingEditValue { id, field },
                vec![self.value_prompt(field)],
            ),
            None => StepOutcome::stay(
                Conversation::AwaitingEditField { id },
                vec![
                    OutgoingMessage::reply("Invalid field. Pick one of the buttons."),
                    self.field_prompt(),
                ],
            ),
        }
    }

    async fn on_edit_value(
        &self,
        owner: OwnerId,
        id: String,
        field: EditField,
        input: &str,
    ) -> StepOutcome {
        let retry = |text: &str| {
            StepOutcome::stay(
                Conversation::AwaitingEditValue {
                    id: id.clone(),
                    field,
                },
                vec![OutgoingMessage::reply(text), self.value_prompt(field)],
            )
        };

        // Only the edited field is written, onto the stored record, so a
        // sent mark recorded by the scheduler meanwhile is kept.
        let change: ScheduleMutation = match field {
            EditField::Title => {
                let title = input.trim().to_string();
                if title.is_empty() {
                    return retry("The title cannot be empty.");
                }
                Box::new(move |s: &mut Schedule| {
                    s.title = title;
                    Ok(())
                })
            }
            EditField::Time => match input.parse::<TimeOfDay>() {
                Ok(time) => Box::new(move |s: &mut Schedule| {
                    s.time_of_day = time;
                    Ok(())
                }),
                Err(_) => return retry("Invalid time format. Use HH:MM (for example 09:30)."),
            },
            EditField::Days => match self.labels.parse_weekday_list(input) {
                Some(days) => Box::new(move |s: &mut Schedule| {
                    s.days = days;
                    Ok(())
                }),
                None => return retry("Unrecognized day list."),
            },
            EditField::Note => {
                let note = if self.labels.is_no_note(input) {
                    String::new()
                } else {
                    input.trim().to_string()
                };
                Box::new(move |s: &mut Schedule| {
                    s.note = note;
                    Ok(())
                })
            }
        };

        match self.store.modify(&id, change).await {
            Ok(updated) => {
                info!(owner = %owner, schedule_id = %updated.id, field = %field, "Schedule updated");
                StepOutcome {
                    replies: vec![
                        OutgoingMessage::plain(format!("✅ {} updated!", field)),
                        self.continue_prompt(),
                    ],
                    next: Some(Conversation::AwaitingEditContinue { id }),
                    change: Some(ScheduleChange::Updated(updated)),
                }
            }
            Err(StoreError::DuplicateTitle(_)) => {
                retry("❌ That title is already used. Use a different one.")
            }
            Err(StoreError::NotFound) => {
                StepOutcome::done(OutgoingMessage::plain("❌ That schedule no longer exists."))
            }
            Err(e) => {
                warn!(owner = %owner, schedule_id = %id, "Failed to update schedule: {}", e);
                retry(GENERIC_FAILURE)
            }
        }
    }

    fn on_edit_continue(&self, id: String, input: &str) -> StepOutcome {
        match self.labels.parse_continue(input) {
            Some(true) => StepOutcome::stay(
                Conversation::AwaitingEditField { id },
                vec![self.field_prompt()],
            ),
            Some(false) => StepOutcome::done(OutgoingMessage::plain(
                "Changes saved. Type /help for help.",
            )),
            None => StepOutcome::stay(
                Conversation::AwaitingEditContinue { id },
                vec![
                    OutgoingMessage::reply("Invalid choice. Pick one of the buttons."),
                    self.continue_prompt(),
                ],
            ),
        }
    }

    // Delete flow

    async fn on_delete_target(&self, owner: OwnerId, input: &str) -> StepOutcome {
        let schedule = match self.store.get_by_title(owner, input.trim()).await {
            Ok(s) => s,
            Err(_) => return StepOutcome::done(OutgoingMessage::plain(NOT_FOUND)),
        };
        match self.store.delete(&schedule.id).await {
            Ok(()) => {
                info!(owner = %owner, schedule_id = %schedule.id, "Schedule deleted");
                StepOutcome {
                    replies: vec![OutgoingMessage::plain("✅ Schedule deleted!")],
                    next: None,
                    change: Some(ScheduleChange::Deleted(schedule.id)),
                }
            }
            Err(StoreError::NotFound) => StepOutcome::done(OutgoingMessage::plain(NOT_FOUND)),
            Err(e) => {
                warn!(owner = %owner, schedule_id = %schedule.id, "Failed to delete schedule: {}", e);
                StepOutcome::done(OutgoingMessage::plain(GENERIC_FAILURE))
            }
        }
    }
}
