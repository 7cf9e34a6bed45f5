//! Session subscribers.

use crate::adapter::lock;
use crate::session::Session;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub type SessionListener = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, SessionListener)>>,
}

impl Subscribers {
    pub(crate) fn add(self: &Arc<Self>, listener: SessionListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.entries).push((id, listener));
        Subscription { id, subscribers: Arc::downgrade(self) }
    }

    fn remove(&self, id: u64) { lock(&self.entries).retain(|(eid, _)| *eid != id) }

    /// Listeners run outside the lock so they may subscribe or unsubscribe.
    pub(crate) fn notify(&self, session: &Session) {
        let listeners: Vec<SessionListener> = lock(&self.entries).iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(session);
        }
    }

    pub(crate) fn len(&self) -> usize { lock(&self.entries).len() }
}

/// Handle returned by `SessionController::subscribe`. Dropping it keeps the
/// listener registered; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
        }
    }
}
