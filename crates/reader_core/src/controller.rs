use std::sync::Arc;

use blob_io::{
    BlobReadService, ByteSource, ReadFormat, ReadNotification, ReadOperation, ReadRequest,
    ReadyState, TokioBlobReader,
};
use shared::{
    domain::{ReadMode, ReaderState, SessionId},
    error::ReaderError,
    protocol::{EventName, ReaderEvent},
};
use tracing::{debug, error};

use crate::{
    callback_registry::CallbackRegistry,
    event_bus::{EventBus, Handler, ListenerId},
    observable::ObservableProperty,
};

#[derive(Debug, Clone, Default)]
struct ReadInputs {
    source: Option<Arc<dyn ByteSource>>,
    mode: ReadMode,
    encoding: Option<String>,
    auto_read: bool,
}

impl ReadInputs {
    fn should_auto_read(&self) -> bool {
        self.auto_read && self.source.is_some()
    }
}

fn same_source(a: &Option<Arc<dyn ByteSource>>, b: &Option<Arc<dyn ByteSource>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

struct ReadSession {
    id: SessionId,
    operation: ReadOperation,
}

pub struct ReadController {
    reader: Arc<dyn BlobReadService>,
    events: Arc<EventBus>,
    callbacks: CallbackRegistry,
    inputs: ReadInputs,
    loading: ObservableProperty<bool>,
    loaded: ObservableProperty<bool>,
    error: ObservableProperty<bool>,
    progress: ObservableProperty<f64>,
    session: Option<ReadSession>,
}

impl ReadController {
    pub fn new() -> Self {
        Self::new_with_reader(Arc::new(TokioBlobReader::default()))
    }

    pub fn new_with_reader(reader: Arc<dyn BlobReadService>) -> Self {
        Self {
            reader,
            events: Arc::new(EventBus::new()),
            callbacks: CallbackRegistry::new(),
            inputs: ReadInputs::default(),
            loading: ObservableProperty::new(false, |loading| ReaderEvent::Loading { loading }),
            loaded: ObservableProperty::new(false, |loaded| ReaderEvent::Loaded { loaded }),
            error: ObservableProperty::new(false, |error| ReaderEvent::ErrorChanged { error }),
            progress: ObservableProperty::new(0.0, |progress| ReaderEvent::Progress { progress }),
            session: None,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn subscribe(&self, name: EventName, handler: Handler) -> ListenerId {
        self.events.subscribe(name, handler)
    }

    pub fn unsubscribe(&self, name: EventName, id: ListenerId) -> bool {
        self.events.unsubscribe(name, id)
    }

    pub fn loading(&self) -> bool {
        self.loading.get()
    }

    pub fn loaded(&self) -> bool {
        self.loaded.get()
    }

    pub fn error(&self) -> bool {
        self.error.get()
    }

    pub fn progress(&self) -> f64 {
        self.progress.get()
    }

    pub fn state(&self) -> ReaderState {
        ReaderState {
            loading: self.loading(),
            loaded: self.loaded(),
            error: self.error(),
            progress: self.progress(),
        }
    }

    pub fn is_reading(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.operation.ready_state() == ReadyState::Loading)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn source(&self) -> Option<&Arc<dyn ByteSource>> {
        self.inputs.source.as_ref()
    }

    pub fn mode(&self) -> ReadMode {
        self.inputs.mode
    }

    pub fn encoding(&self) -> Option<&str> {
        self.inputs.encoding.as_deref()
    }

    pub fn auto_read(&self) -> bool {
        self.inputs.auto_read
    }

    pub fn set_source(&mut self, source: Option<Arc<dyn ByteSource>>) {
        if same_source(&self.inputs.source, &source) {
            return;
        }
        self.inputs.source = source;
        self.reconcile();
    }

    pub fn set_mode(&mut self, mode: ReadMode) {
        if self.inputs.mode == mode {
            return;
        }
        self.inputs.mode = mode;
        self.reconcile();
    }

    pub fn set_mode_name(&mut self, mode: &str) -> Result<(), ReaderError> {
        let mode = mode.parse::<ReadMode>()?;
        self.set_mode(mode);
        Ok(())
    }

    pub fn set_encoding(&mut self, encoding: Option<String>) {
        if self.inputs.encoding == encoding {
            return;
        }
        self.inputs.encoding = encoding;
        self.reconcile();
    }

    pub fn set_auto_read(&mut self, auto_read: bool) {
        if self.inputs.auto_read == auto_read {
            return;
        }
        self.inputs.auto_read = auto_read;
        self.reconcile();
    }

    fn reconcile(&mut self) {
        let inputs = self.inputs.clone();
        if !inputs.should_auto_read() {
            return;
        }
        if let Err(err) = self.start_read(inputs) {
            error!("read: auto read failed to start err={err}");
        }
    }

    pub fn read(&mut self) -> Result<(), ReaderError> {
        let inputs = self.inputs.clone();
        self.start_read(inputs)
    }

    fn start_read(&mut self, inputs: ReadInputs) -> Result<(), ReaderError> {
        let source = inputs.source.ok_or(ReaderError::MissingSource)?;

        self.abort();

        self.loaded.set(false, &self.events);
        self.loading.set(true, &self.events);
        self.error.set(false, &self.events);
        self.progress.set(0.0, &self.events);

        let request = ReadRequest {
            source,
            format: ReadFormat::new(inputs.mode, inputs.encoding.as_deref()),
        };
        let operation = match self.reader.start(request) {
            Ok(operation) => operation,
            Err(err) => {
                error!("read: reader refused request mode={} err={err}", inputs.mode);
                self.loading.set(false, &self.events);
                return Err(err);
            }
        };

        let id = SessionId::new();
        debug!("read: session started session={id} mode={}", inputs.mode);
        self.session = Some(ReadSession { id, operation });
        Ok(())
    }

    pub fn abort(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(notification) = session.operation.cancel() {
            self.handle_notification(notification);
        }
        debug!("read: session detached session={}", session.id);
    }

    /// Returns `false` when there is nothing left to wait for.
    pub async fn next_notification(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let Some(notification) = session.operation.next().await else {
            return false;
        };
        self.handle_notification(notification);
        true
    }

    pub fn dispatch_pending(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(notification) = self
            .session
            .as_mut()
            .and_then(|session| session.operation.try_next())
        {
            self.handle_notification(notification);
            dispatched += 1;
        }
        dispatched
    }

    pub async fn settle(&mut self) {
        while self.next_notification().await {}
    }

    pub fn teardown(&mut self) {
        if self.session.is_some() && !self.loaded() {
            self.abort();
        }
        self.session = None;
    }

    fn handle_notification(&mut self, notification: ReadNotification) {
        match notification {
            ReadNotification::Progress { loaded, total } => {
                let Some(total) = total else {
                    return;
                };
                let progress = if total == 0 {
                    1.0
                } else {
                    (loaded as f64 / total as f64).clamp(0.0, 1.0)
                };
                self.progress.set(progress, &self.events);
            }
            ReadNotification::Error(failure) => {
                debug!("read: session failed err={failure}");
                self.error.set(true, &self.events);
                self.loading.set(false, &self.events);
                self.loaded.set(true, &self.events);
                self.events
                    .publish(&ReaderEvent::ReadFailed { error: failure });
            }
            ReadNotification::Load(result) => {
                self.loading.set(false, &self.events);
                self.loaded.set(true, &self.events);
                self.events.publish(&ReaderEvent::ReadCompleted { result });
            }
            ReadNotification::Abort => {
                self.loading.set(false, &self.events);
                self.loaded.set(false, &self.events);
                self.events.publish(&ReaderEvent::Abort);
            }
        }
    }
}

impl Default for ReadController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReadController {
    fn drop(&mut self) {
        self.teardown();
    }
}

macro_rules! callback_slots {
    ($($getter:ident, $setter:ident => $name:expr;)*) => {
        impl ReadController {
            $(
                pub fn $getter(&self) -> Option<Handler> {
                    self.callbacks.get($name)
                }

                pub fn $setter(&mut self, handler: Option<Handler>) {
                    self.callbacks.register(&self.events, $name, handler);
                }
            )*
        }
    };
}

callback_slots! {
    on_progress, set_on_progress => EventName::Progress;
    on_error, set_on_error => EventName::Error;
    on_loading, set_on_loading => EventName::Loading;
    on_loaded, set_on_loaded => EventName::Loaded;
    on_read_completed, set_on_read_completed => EventName::ReadCompleted;
    on_abort, set_on_abort => EventName::Abort;
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
