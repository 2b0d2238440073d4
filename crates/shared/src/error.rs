use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailureKind {
    NotFound,
    PermissionDenied,
    NotReadable,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ReadFailure {
    pub kind: ReadFailureKind,
    pub message: String,
}

impl ReadFailure {
    pub fn new(kind: ReadFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<io::Error> for ReadFailure {
    fn from(value: io::Error) -> Self {
        let kind = match value.kind() {
            io::ErrorKind::NotFound => ReadFailureKind::NotFound,
            io::ErrorKind::PermissionDenied => ReadFailureKind::PermissionDenied,
            io::ErrorKind::Interrupted | io::ErrorKind::UnexpectedEof => {
                ReadFailureKind::Interrupted
            }
            _ => ReadFailureKind::NotReadable,
        };
        Self::new(kind, value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("unsupported read mode '{0}'")]
    UnsupportedMode(String),
    #[error("no source set")]
    MissingSource,
    #[error("no async runtime available to schedule the read")]
    RuntimeUnavailable,
}
