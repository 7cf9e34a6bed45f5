//! Listener registry shared by every adapter.

use super::{lock, AccountInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type AccountsCallback = Arc<dyn Fn(AccountInfo) + Send + Sync>;
pub type SessionEndedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Holds registered callbacks and fans events out to them. Callbacks run
/// outside the lock, in registration order, once per emitted event.
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    accounts: Mutex<Vec<(ListenerId, AccountsCallback)>>,
    ended: Mutex<Vec<(ListenerId, SessionEndedCallback)>>,
}

impl EventHub {
    pub fn new() -> Self { Self::default() }

    fn next_id(&self) -> ListenerId { ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed)) }

    pub fn on_accounts_changed(&self, callback: AccountsCallback) -> ListenerId {
        let id = self.next_id();
        lock(&self.accounts).push((id, callback));
        id
    }

    pub fn on_session_ended(&self, callback: SessionEndedCallback) -> ListenerId {
        let id = self.next_id();
        lock(&self.ended).push((id, callback));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        lock(&self.accounts).retain(|(lid, _)| *lid != id);
        lock(&self.ended).retain(|(lid, _)| *lid != id);
    }

    pub fn emit_accounts(&self, info: AccountInfo) {
        let callbacks: Vec<AccountsCallback> = lock(&self.accounts).iter().map(|(_, cb)| cb.clone()).collect();
        for cb in callbacks {
            cb(info.clone());
        }
    }

    pub fn emit_session_ended(&self) {
        let callbacks: Vec<SessionEndedCallback> = lock(&self.ended).iter().map(|(_, cb)| cb.clone()).collect();
        for cb in callbacks {
            cb();
        }
    }

    pub fn listener_count(&self) -> usize { lock(&self.accounts).len() + lock(&self.ended).len() }
}
