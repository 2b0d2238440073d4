use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{domain::ReadResult, error::ReadFailure};

// `Error` carries both the `error` state change and read failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    Progress,
    Error,
    Loading,
    Loaded,
    ReadCompleted,
    Abort,
}

impl EventName {
    pub const ALL: [EventName; 6] = [
        EventName::Progress,
        EventName::Error,
        EventName::Loading,
        EventName::Loaded,
        EventName::ReadCompleted,
        EventName::Abort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Progress => "progress",
            EventName::Error => "error",
            EventName::Loading => "loading",
            EventName::Loaded => "loaded",
            EventName::ReadCompleted => "read-completed",
            EventName::Abort => "abort",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ReaderEvent {
    Progress { progress: f64 },
    Loading { loading: bool },
    Loaded { loaded: bool },
    ErrorChanged { error: bool },
    ReadFailed { error: ReadFailure },
    ReadCompleted { result: ReadResult },
    Abort,
}

impl ReaderEvent {
    pub fn name(&self) -> EventName {
        match self {
            ReaderEvent::Progress { .. } => EventName::Progress,
            ReaderEvent::Loading { .. } => EventName::Loading,
            ReaderEvent::Loaded { .. } => EventName::Loaded,
            ReaderEvent::ErrorChanged { .. } | ReaderEvent::ReadFailed { .. } => EventName::Error,
            ReaderEvent::ReadCompleted { .. } => EventName::ReadCompleted,
            ReaderEvent::Abort => EventName::Abort,
        }
    }
}
