//! Test infrastructure: TestChannel, FailingChannel and TestHarness.
//!
//! Provides a fully wired dispatcher and scheduler over a JSON store in a
//! temp directory, suitable for integration tests that exercise the real
//! conversation and firing paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::dispatcher::Dispatcher;
use crate::labels::{Labels, Locale};
use crate::scheduler::ReminderScheduler;
use crate::state::JsonScheduleStore;
use crate::traits::{Channel, DEFAULT_LEAD_TIMES};
use crate::types::{OutgoingMessage, OwnerId};

// ---------------------------------------------------------------------------
// TestChannel
// ---------------------------------------------------------------------------

/// Captured message sent via the channel.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub owner: OwnerId,
    pub message: OutgoingMessage,
}

/// A test channel that captures all outgoing messages.
pub struct TestChannel {
    pub messages: Mutex<Vec<SentMessage>>,
}

impl TestChannel {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Texts sent to one owner, oldest first.
    pub async fn texts_for(&self, owner: OwnerId) -> Vec<String> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.owner == owner)
            .map(|m| m.message.text.clone())
            .collect()
    }

    pub async fn last_for(&self, owner: OwnerId) -> Option<OutgoingMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.owner == owner)
            .map(|m| m.message.clone())
    }

    /// Total number of messages sent.
    pub async fn message_count(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }
}

#[async_trait]
impl Channel for TestChannel {
    fn name(&self) -> String {
        "test".to_string()
    }

    async fn send(&self, owner: OwnerId, message: &OutgoingMessage) -> anyhow::Result<()> {
        self.messages.lock().await.push(SentMessage {
            owner,
            message: message.clone(),
        });
        Ok(())
    }
}

/// A channel whose every delivery fails, counting the attempts.
pub struct FailingChannel {
    pub attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for FailingChannel {
    fn name(&self) -> String {
        "failing".to_string()
    }

    async fn send(&self, _owner: OwnerId, _message: &OutgoingMessage) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("transport unavailable")
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// Everything needed to run integration tests against the bot.
pub struct TestHarness {
    pub dispatcher: Dispatcher,
    pub scheduler: Arc<ReminderScheduler>,
    pub store: Arc<JsonScheduleStore>,
    pub channel: Arc<TestChannel>,
    /// Keep the temp dir alive; the store file is deleted when this drops.
    pub dir: tempfile::TempDir,
}

impl TestHarness {
    /// Send each message in order as `owner`.
    pub async fn say(&self, owner: OwnerId, messages: &[&str]) {
        for text in messages {
            self.dispatcher.handle(owner, text).await.unwrap();
        }
    }
}

/// Build a fully wired bot over a fresh store in a temp directory.
///
/// Each call creates an isolated store, so tests can run in parallel.
pub async fn setup_test_bot() -> anyhow::Result<TestHarness> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(JsonScheduleStore::open(dir.path().join("data/schedules.json")).await?);
    let channel = Arc::new(TestChannel::new());
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        channel.clone(),
        1,
        2,
    ));
    let dispatcher = Dispatcher::new(
        store.clone(),
        channel.clone(),
        scheduler.clone(),
        Labels::for_locale(Locale::En),
        DEFAULT_LEAD_TIMES.to_vec(),
    );
    Ok(TestHarness {
        dispatcher,
        scheduler,
        store,
        channel,
        dir,
    })
}
