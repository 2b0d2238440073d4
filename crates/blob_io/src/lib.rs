use std::{io, sync::Arc};

use serde::Deserialize;
use shared::{
    domain::{ReadMode, ReadResult},
    error::{ReadFailure, ReadFailureKind, ReaderError},
};
use tokio::{
    io::AsyncReadExt,
    runtime::Handle,
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::debug;

pub mod encoding;
pub mod source;

pub use encoding::{decode_text, encode_data_url};
pub use source::{Blob, ByteSource, ByteStream, FileBlob, OpenedBytes};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;
pub const NOTIFICATION_BUFFER: usize = 16;
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFormat {
    Text { encoding: Option<String> },
    ArrayBuffer,
    DataUrl,
}

impl ReadFormat {
    pub fn new(mode: ReadMode, encoding: Option<&str>) -> Self {
        match mode {
            ReadMode::Text => ReadFormat::Text {
                encoding: encoding.map(str::to_string),
            },
            ReadMode::ArrayBuffer => ReadFormat::ArrayBuffer,
            ReadMode::DataUrl => ReadFormat::DataUrl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub source: Arc<dyn ByteSource>,
    pub format: ReadFormat,
}

// Exactly one of `Load`, `Error` or `Abort` ends an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadNotification {
    Progress { loaded: u64, total: Option<u64> },
    Load(ReadResult),
    Error(ReadFailure),
    Abort,
}

impl ReadNotification {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadNotification::Progress { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Done,
}

// `Done` is set when the terminal notification is handed out, not when the
// task queues it.
pub struct ReadOperation {
    notifications: mpsc::Receiver<ReadNotification>,
    task: Option<JoinHandle<()>>,
    ready_state: ReadyState,
}

impl ReadOperation {
    pub fn new(
        notifications: mpsc::Receiver<ReadNotification>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            notifications,
            task,
            ready_state: ReadyState::Loading,
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub async fn next(&mut self) -> Option<ReadNotification> {
        if self.ready_state == ReadyState::Done {
            return None;
        }
        let notification = self
            .notifications
            .recv()
            .await
            .unwrap_or_else(task_vanished);
        Some(self.observe(notification))
    }

    pub fn try_next(&mut self) -> Option<ReadNotification> {
        if self.ready_state == ReadyState::Done {
            return None;
        }
        let notification = match self.notifications.try_recv() {
            Ok(notification) => notification,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => task_vanished(),
        };
        Some(self.observe(notification))
    }

    /// Returns `Abort` only if the read had not finished yet.
    pub fn cancel(&mut self) -> Option<ReadNotification> {
        if self.ready_state == ReadyState::Done {
            return None;
        }
        self.ready_state = ReadyState::Done;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.notifications.close();
        Some(ReadNotification::Abort)
    }

    fn observe(&mut self, notification: ReadNotification) -> ReadNotification {
        if notification.is_terminal() {
            self.ready_state = ReadyState::Done;
        }
        notification
    }
}

impl Drop for ReadOperation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn task_vanished() -> ReadNotification {
    ReadNotification::Error(ReadFailure::new(
        ReadFailureKind::Interrupted,
        "read task ended without a result",
    ))
}

pub trait BlobReadService: Send + Sync {
    fn start(&self, request: ReadRequest) -> Result<ReadOperation, ReaderError>;
}

#[derive(Debug, Clone, Default)]
pub struct TokioBlobReader {
    config: ReaderConfig,
}

impl TokioBlobReader {
    pub fn new(mut config: ReaderConfig) -> Self {
        config.chunk_size = config.chunk_size.clamp(1, MAX_CHUNK_SIZE);
        Self { config }
    }
}

impl BlobReadService for TokioBlobReader {
    fn start(&self, request: ReadRequest) -> Result<ReadOperation, ReaderError> {
        let runtime = Handle::try_current().map_err(|_| ReaderError::RuntimeUnavailable)?;
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let task = runtime.spawn(run_read(request, self.config.chunk_size, tx));
        Ok(ReadOperation::new(rx, Some(task)))
    }
}

async fn run_read(
    request: ReadRequest,
    chunk_size: usize,
    tx: mpsc::Sender<ReadNotification>,
) {
    let notification = match read_all(request.source.as_ref(), chunk_size, &tx).await {
        Ok(bytes) => {
            debug!(
                "read: source drained bytes={} mime_type={}",
                bytes.len(),
                request.source.mime_type()
            );
            ReadNotification::Load(finish(bytes, &request))
        }
        Err(err) => {
            debug!("read: source failed err={err}");
            ReadNotification::Error(err.into())
        }
    };
    let _ = tx.send(notification).await;
}

async fn read_all(
    source: &dyn ByteSource,
    chunk_size: usize,
    tx: &mpsc::Sender<ReadNotification>,
) -> io::Result<Vec<u8>> {
    let OpenedBytes { mut stream, total } = source.open().await?;
    let capacity = total
        .and_then(|total| usize::try_from(total).ok())
        .unwrap_or(0)
        .min(MAX_PREALLOCATION);
    let mut bytes = Vec::with_capacity(capacity);
    let mut chunk = vec![0u8; chunk_size];
    let mut reported = false;

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
        // Waits while the owner is behind on notifications.
        let sent = tx
            .send(ReadNotification::Progress {
                loaded: bytes.len() as u64,
                total,
            })
            .await;
        if sent.is_err() {
            return Err(io::ErrorKind::Interrupted.into());
        }
        reported = true;
    }

    // Empty sources still get one progress notification.
    if !reported {
        let _ = tx.send(ReadNotification::Progress { loaded: 0, total }).await;
    }

    Ok(bytes)
}

fn finish(bytes: Vec<u8>, request: &ReadRequest) -> ReadResult {
    match &request.format {
        ReadFormat::Text { encoding } => ReadResult::Text(decode_text(&bytes, encoding.as_deref())),
        ReadFormat::ArrayBuffer => ReadResult::ArrayBuffer(bytes),
        ReadFormat::DataUrl => {
            ReadResult::DataUrl(encode_data_url(&bytes, request.source.mime_type()))
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
