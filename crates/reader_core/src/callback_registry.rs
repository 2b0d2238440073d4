use std::{collections::HashMap, sync::Arc};

use shared::protocol::EventName;
use tracing::debug;

use crate::event_bus::{EventBus, Handler, ListenerId};

#[derive(Default)]
pub struct CallbackRegistry {
    slots: HashMap<EventName, (ListenerId, Handler)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bus: &EventBus, name: EventName, handler: Option<Handler>) {
        if let Some((previous, _)) = self.slots.remove(&name) {
            bus.unsubscribe(name, previous);
            debug!("reader: slot cleared event={name}");
        }
        let Some(handler) = handler else {
            return;
        };
        let id = bus.subscribe(name, Arc::clone(&handler));
        self.slots.insert(name, (id, handler));
    }

    pub fn get(&self, name: EventName) -> Option<Handler> {
        self.slots.get(&name).map(|(_, handler)| Arc::clone(handler))
    }
}

#[cfg(test)]
#[path = "tests/callback_registry_tests.rs"]
mod tests;
