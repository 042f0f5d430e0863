//! Per-owner conversation sessions.
//!
//! Each owner gets its own async mutex. Whoever handles an inbound message
//! holds that owner's guard for the whole step, so two messages from the
//! same owner can never interleave on one draft while different owners
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::conversation::Conversation;
use crate::types::OwnerId;

type Slot = Arc<Mutex<Option<Conversation>>>;

#[derive(Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<OwnerId, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access to `owner`'s conversation state. `None` means idle.
    pub async fn lock(&self, owner: OwnerId) -> OwnedMutexGuard<Option<Conversation>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(owner).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Drop slots of idle owners that nobody is holding or about to lock.
    /// A caller of `lock` owns a clone of the slot from the moment it leaves
    /// the map, so only slots referenced by the map alone can go.
    pub async fn prune_idle(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => state.is_some(),
                Err(_) => true,
            }
        });
        before - slots.len()
    }

    #[cfg(test)]
    pub async fn is_active(&self, owner: OwnerId) -> bool {
        self.lock(owner).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn state_survives_between_locks() {
        let sessions = SessionStore::new();
        {
            let mut guard = sessions.lock(OwnerId(1)).await;
            *guard = Some(Conversation::AwaitingTitle);
        }
        assert!(sessions.is_active(OwnerId(1)).await);
        assert!(!sessions.is_active(OwnerId(2)).await);
    }

    #[tokio::test]
    async fn same_owner_is_serialized_other_owners_are_not() {
        let sessions = Arc::new(SessionStore::new());
        let held = sessions.lock(OwnerId(7)).await;

        // Another owner is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(200), sessions.lock(OwnerId(8))).await;
        assert!(other.is_ok());

        // The same owner waits until the first guard is released.
        let contender = {
            let sessions = sessions.clone();
            tokio::spawn(async move {
                let mut guard = sessions.lock(OwnerId(7)).await;
                *guard = Some(Conversation::AwaitingDeleteTarget);
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        drop(held);
        contender.await.unwrap();
        assert!(sessions.is_active(OwnerId(7)).await);
    }

    #[tokio::test]
    async fn prune_keeps_active_conversations() {
        let sessions = SessionStore::new();
        *sessions.lock(OwnerId(1)).await = Some(Conversation::AwaitingTitle);
        let _ = sessions.lock(OwnerId(2)).await;
        assert_eq!(sessions.prune_idle().await, 1);
        assert!(sessions.is_active(OwnerId(1)).await);
    }

    #[tokio::test]
    async fn prune_spares_slot_between_lookup_and_lock() {
        let sessions = SessionStore::new();
        // A handler has taken the slot out of the map but not locked it yet.
        let pending = sessions
            .slots
            .lock()
            .await
            .entry(OwnerId(3))
            .or_default()
            .clone();
        assert_eq!(sessions.prune_idle().await, 0);

        *pending.lock_owned().await = Some(Conversation::AwaitingTitle);
        assert!(sessions.is_active(OwnerId(3)).await);
    }
}
