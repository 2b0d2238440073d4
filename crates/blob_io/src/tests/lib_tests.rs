use super::*;
use std::{io::Write as _, sync::Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncWriteExt, DuplexStream};

#[derive(Debug)]
struct PipeSource {
    reader: Mutex<Option<DuplexStream>>,
}

impl PipeSource {
    fn new() -> (Self, DuplexStream) {
        let (writer, reader) = tokio::io::duplex(64);
        (
            Self {
                reader: Mutex::new(Some(reader)),
            },
            writer,
        )
    }
}

#[async_trait]
impl ByteSource for PipeSource {
    fn mime_type(&self) -> &str {
        "text/plain"
    }

    async fn open(&self) -> io::Result<OpenedBytes> {
        let reader = self
            .reader
            .lock()
            .expect("pipe lock")
            .take()
            .ok_or_else(|| io::Error::other("pipe already opened"))?;
        Ok(OpenedBytes {
            stream: Box::new(reader),
            total: None,
        })
    }
}

fn reader_with_chunk(chunk_size: usize) -> TokioBlobReader {
    TokioBlobReader::new(ReaderConfig { chunk_size })
}

async fn drain(operation: &mut ReadOperation) -> Vec<ReadNotification> {
    let mut seen = Vec::new();
    while let Some(notification) = operation.next().await {
        seen.push(notification);
    }
    seen
}

#[tokio::test]
async fn text_read_reports_progress_per_chunk_then_loads() {
    let blob = Arc::new(Blob::from_text("hello world"));
    let mut operation = reader_with_chunk(4)
        .start(ReadRequest {
            source: blob,
            format: ReadFormat::new(ReadMode::Text, None),
        })
        .expect("start");

    let seen = drain(&mut operation).await;
    assert_eq!(
        seen,
        vec![
            ReadNotification::Progress {
                loaded: 4,
                total: Some(11)
            },
            ReadNotification::Progress {
                loaded: 8,
                total: Some(11)
            },
            ReadNotification::Progress {
                loaded: 11,
                total: Some(11)
            },
            ReadNotification::Load(ReadResult::Text("hello world".into())),
        ]
    );
    assert_eq!(operation.ready_state(), ReadyState::Done);
}

#[tokio::test]
async fn array_buffer_read_returns_raw_bytes() {
    let blob = Arc::new(Blob::from_bytes(vec![0u8, 159, 146, 150]));
    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: blob,
            format: ReadFormat::ArrayBuffer,
        })
        .expect("start");

    let last = drain(&mut operation).await.pop().expect("terminal");
    assert_eq!(
        last,
        ReadNotification::Load(ReadResult::ArrayBuffer(vec![0, 159, 146, 150]))
    );
}

#[tokio::test]
async fn empty_source_still_reports_progress() {
    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: Arc::new(Blob::from_text("")),
            format: ReadFormat::new(ReadMode::Text, None),
        })
        .expect("start");

    let seen = drain(&mut operation).await;
    assert_eq!(
        seen,
        vec![
            ReadNotification::Progress {
                loaded: 0,
                total: Some(0)
            },
            ReadNotification::Load(ReadResult::Text(String::new())),
        ]
    );
}

#[tokio::test]
async fn file_read_as_data_url_uses_guessed_mime_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("note.txt");
    let mut file = std::fs::File::create(&path).expect("create");
    file.write_all(b"file body").expect("write");
    drop(file);

    let source = FileBlob::new(&path);
    assert_eq!(source.mime_type(), "text/plain");
    assert_eq!(source.name(), Some("note.txt"));
    source.last_modified().await.expect("mtime");

    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: Arc::new(source),
            format: ReadFormat::DataUrl,
        })
        .expect("start");

    let last = drain(&mut operation).await.pop().expect("terminal");
    let ReadNotification::Load(ReadResult::DataUrl(url)) = last else {
        panic!("expected data url, got {last:?}");
    };
    let payload = url
        .strip_prefix("data:text/plain;base64,")
        .expect("data url prefix");
    assert_eq!(STANDARD.decode(payload).expect("base64"), b"file body");
}

#[tokio::test]
async fn missing_file_fails_with_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: Arc::new(FileBlob::new(dir.path().join("absent.bin"))),
            format: ReadFormat::ArrayBuffer,
        })
        .expect("start");

    let seen = drain(&mut operation).await;
    assert_eq!(seen.len(), 1);
    let ReadNotification::Error(failure) = &seen[0] else {
        panic!("expected failure, got {:?}", seen[0]);
    };
    assert_eq!(failure.kind, ReadFailureKind::NotFound);
}

#[tokio::test]
async fn unknown_size_source_reports_no_total() {
    let (source, mut writer) = PipeSource::new();
    let mut operation = reader_with_chunk(64)
        .start(ReadRequest {
            source: Arc::new(source),
            format: ReadFormat::new(ReadMode::Text, Some("utf-8")),
        })
        .expect("start");

    writer.write_all(b"streamed").await.expect("write");
    drop(writer);

    let seen = drain(&mut operation).await;
    assert!(seen
        .iter()
        .filter(|n| !n.is_terminal())
        .all(|n| matches!(n, ReadNotification::Progress { total: None, .. })));
    assert_eq!(
        seen.last(),
        Some(&ReadNotification::Load(ReadResult::Text("streamed".into())))
    );
}

#[tokio::test]
async fn cancel_in_flight_read_yields_abort_once() {
    let (source, _writer) = PipeSource::new();
    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: Arc::new(source),
            format: ReadFormat::ArrayBuffer,
        })
        .expect("start");

    assert_eq!(operation.ready_state(), ReadyState::Loading);
    assert_eq!(operation.cancel(), Some(ReadNotification::Abort));
    assert_eq!(operation.ready_state(), ReadyState::Done);
    assert_eq!(operation.cancel(), None);
    assert_eq!(operation.next().await, None);
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() {
    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: Arc::new(Blob::from_text("done")),
            format: ReadFormat::new(ReadMode::Text, None),
        })
        .expect("start");

    drain(&mut operation).await;
    assert_eq!(operation.cancel(), None);
}

#[tokio::test]
async fn cancel_wins_over_a_queued_load() {
    let mut operation = TokioBlobReader::default()
        .start(ReadRequest {
            source: Arc::new(Blob::from_text("quick")),
            format: ReadFormat::new(ReadMode::Text, None),
        })
        .expect("start");

    // Let the task finish and queue its notifications without handing them out.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(operation.cancel(), Some(ReadNotification::Abort));
    assert_eq!(operation.try_next(), None);
}

#[tokio::test]
async fn closed_channel_without_terminal_surfaces_as_failure() {
    let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
    let mut operation = ReadOperation::new(rx, None);
    tx.send(ReadNotification::Progress {
        loaded: 1,
        total: Some(2),
    })
    .await
    .expect("send");
    drop(tx);

    assert!(matches!(
        operation.try_next(),
        Some(ReadNotification::Progress { loaded: 1, .. })
    ));
    assert!(matches!(
        operation.try_next(),
        Some(ReadNotification::Error(ReadFailure {
            kind: ReadFailureKind::Interrupted,
            ..
        }))
    ));
    assert_eq!(operation.try_next(), None);
}

#[tokio::test]
async fn oversized_chunk_size_is_clamped_and_still_loads() {
    let reader = reader_with_chunk(usize::MAX);
    assert_eq!(reader.config.chunk_size, MAX_CHUNK_SIZE);

    let mut operation = reader
        .start(ReadRequest {
            source: Arc::new(Blob::from_text("hello")),
            format: ReadFormat::new(ReadMode::Text, None),
        })
        .expect("start");

    assert_eq!(
        drain(&mut operation).await,
        vec![
            ReadNotification::Progress {
                loaded: 5,
                total: Some(5)
            },
            ReadNotification::Load(ReadResult::Text("hello".into())),
        ]
    );
}

#[test]
fn zero_chunk_size_is_raised_to_one_byte() {
    assert_eq!(reader_with_chunk(0).config.chunk_size, 1);
}

#[tokio::test]
async fn slow_owner_caps_queued_notifications() {
    let body = "x".repeat(200);
    let mut operation = reader_with_chunk(1)
        .start(ReadRequest {
            source: Arc::new(Blob::from_text(&body)),
            format: ReadFormat::new(ReadMode::Text, None),
        })
        .expect("start");

    // The reader task parks once the queue is full.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let mut queued = 0;
    while operation.try_next().is_some() {
        queued += 1;
    }
    assert_eq!(queued, NOTIFICATION_BUFFER);

    let rest = drain(&mut operation).await;
    assert_eq!(queued + rest.len(), 201);
    assert_eq!(rest.last(), Some(&ReadNotification::Load(ReadResult::Text(body))));
}

#[test]
fn start_outside_runtime_is_refused() {
    let result = TokioBlobReader::default().start(ReadRequest {
        source: Arc::new(Blob::from_text("x")),
        format: ReadFormat::ArrayBuffer,
    });
    assert!(matches!(result, Err(ReaderError::RuntimeUnavailable)));
}
