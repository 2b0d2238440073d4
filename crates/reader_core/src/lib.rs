pub mod callback_registry;
pub mod controller;
pub mod event_bus;
pub mod observable;

pub use callback_registry::CallbackRegistry;
pub use controller::ReadController;
pub use event_bus::{handler, EventBus, Handler, ListenerId};
pub use observable::ObservableProperty;
