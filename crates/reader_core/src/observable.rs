use shared::protocol::ReaderEvent;

use crate::event_bus::EventBus;

#[derive(Debug, Clone)]
pub struct ObservableProperty<T> {
    value: T,
    to_event: fn(T) -> ReaderEvent,
}

impl<T: Clone + PartialEq> ObservableProperty<T> {
    pub fn new(initial: T, to_event: fn(T) -> ReaderEvent) -> Self {
        Self {
            value: initial,
            to_event,
        }
    }

    pub fn get(&self) -> T {
        self.value.clone()
    }

    /// Equal values are ignored.
    pub fn set(&mut self, value: T, bus: &EventBus) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value.clone();
        bus.publish(&(self.to_event)(value));
        true
    }
}
