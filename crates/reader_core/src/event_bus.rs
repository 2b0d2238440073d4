use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use shared::protocol::{EventName, ReaderEvent};

pub type ListenerId = u64;
pub type Handler = Arc<dyn Fn(&ReaderEvent) + Send + Sync>;

pub fn handler(callback: impl Fn(&ReaderEvent) + Send + Sync + 'static) -> Handler {
    Arc::new(callback)
}

pub struct EventBus {
    listeners: Mutex<HashMap<EventName, Vec<(ListenerId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, name: EventName, handler: Handler) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(name)
            .or_default()
            .push((id, handler));
        id
    }

    pub fn unsubscribe(&self, name: EventName, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(&name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(listener_id, _)| *listener_id != id);
        before != entries.len()
    }

    // Handlers added or removed during delivery only see later events.
    pub fn publish(&self, event: &ReaderEvent) {
        let snapshot: Vec<Handler> = {
            let listeners = self.listeners.lock();
            listeners
                .get(&event.name())
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners.lock().get(&name).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
