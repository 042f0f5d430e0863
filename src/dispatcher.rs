//! Routes inbound `(owner, text)` events.
//!
//! Commands go to a fixed table; anything else feeds the owner's active
//! conversation, or gets a help hint when there is none. The owner's
//! session guard is held until every reply has been sent, so replies to
//! consecutive messages from one owner never interleave.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::formatting::{build_help_text, format_schedule_list};
use crate::conversation::{Conversation, ConversationEngine, StepOutcome};
use crate::labels::Labels;
use crate::scheduler::ReminderScheduler;
use crate::session::SessionStore;
use crate::traits::{Channel, ScheduleStore};
use crate::types::{OutgoingMessage, OwnerId};

const EMPTY_STATE: &str = "You don't have any schedules yet. Use /add to create one.";
const FALLBACK_HINT: &str = "Type /help for help.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
    Add,
    List,
    Edit,
    Delete,
    Cancel,
    Unknown,
}

/// Parse `/cmd` or `/cmd@botname`, ignoring any arguments.
fn parse_command(text: &str) -> Option<Command> {
    let head = text.strip_prefix('/')?.splitn(2, ' ').next().unwrap_or("");
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    Some(match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "add" => Command::Add,
        "list" => Command::List,
        "edit" => Command::Edit,
        "delete" => Command::Delete,
        "cancel" => Command::Cancel,
        _ => Command::Unknown,
    })
}

pub struct Dispatcher {
    store: Arc<dyn ScheduleStore>,
    channel: Arc<dyn Channel>,
    scheduler: Arc<ReminderScheduler>,
    engine: ConversationEngine,
    sessions: SessionStore,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        channel: Arc<dyn Channel>,
        scheduler: Arc<ReminderScheduler>,
        labels: &'static Labels,
        lead_times: Vec<u32>,
    ) -> Self {
        let engine = ConversationEngine::new(store.clone(), labels, lead_times);
        Self {
            store,
            channel,
            scheduler,
            engine,
            sessions: SessionStore::new(),
        }
    }

    /// Handle one inbound message. Delivery failures are logged, not
    /// returned; `Err` means the message could not be processed at all.
    pub async fn handle(&self, owner: OwnerId, text: &str) -> anyhow::Result<()> {
        let text = text.trim();
        let mut session = self.sessions.lock(owner).await;

        let replies = match parse_command(text) {
            Some(command) => {
                debug!(owner = %owner, command = ?command, "Command received");
                self.run_command(owner, command, &mut session).await
            }
            None => match session.take() {
                Some(state) => {
                    let outcome = self.engine.step(owner, state, text).await;
                    self.finish_step(outcome, &mut session).await
                }
                None => vec![OutgoingMessage::reply(FALLBACK_HINT)],
            },
        };

        for reply in &replies {
            if let Err(e) = self.channel.send(owner, reply).await {
                warn!(channel = %self.channel.name(), owner = %owner, "Failed to send reply: {}", e);
            }
        }

        let idle = session.is_none();
        drop(session);
        if idle {
            self.sessions.prune_idle().await;
        }
        Ok(())
    }

    async fn finish_step(
        &self,
        outcome: StepOutcome,
        session: &mut Option<Conversation>,
    ) -> Vec<OutgoingMessage> {
        if let Some(change) = &outcome.change {
            self.scheduler.apply(change).await;
        }
        *session = outcome.next;
        outcome.replies
    }

    async fn run_command(
        &self,
        owner: OwnerId,
        command: Command,
        session: &mut Option<Conversation>,
    ) -> Vec<OutgoingMessage> {
        match command {
            Command::Start => {
                *session = None;
                vec![OutgoingMessage::plain(build_help_text(self.engine.lead_times()))]
            }
            Command::Help => vec![OutgoingMessage::reply(build_help_text(self.engine.lead_times()))],
            Command::Add => {
                info!(owner = %owner, "Starting add conversation");
                self.finish_step(self.engine.begin_add(), session).await
            }
            Command::List => {
                let schedules = self.store.list_by_owner(owner).await;
                if schedules.is_empty() {
                    return vec![OutgoingMessage::reply(EMPTY_STATE)];
                }
                vec![OutgoingMessage::html(format_schedule_list(
                    &schedules,
                    self.engine.labels(),
                ))]
            }
            Command::Edit | Command::Delete => {
                let schedules = self.store.list_by_owner(owner).await;
                if schedules.is_empty() {
                    *session = None;
                    return vec![OutgoingMessage::plain(EMPTY_STATE)];
                }
                let outcome = if command == Command::Edit {
                    self.engine.begin_edit()
                } else {
                    self.engine.begin_delete()
                };
                let mut replies = vec![OutgoingMessage::html(format_schedule_list(
                    &schedules,
                    self.engine.labels(),
                ))];
                replies.extend(self.finish_step(outcome, session).await);
                replies
            }
            Command::Cancel => match session.take() {
                Some(_) => self.engine.cancel().replies,
                None => vec![OutgoingMessage::plain("Nothing to cancel.")],
            },
            Command::Unknown => vec![OutgoingMessage::reply(
                "Unknown command. Type /help for help.",
            )],
        }
    }
}
