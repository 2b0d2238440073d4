use std::{
    fmt,
    io::{self, Cursor},
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::DEFAULT_MIME_TYPE;
use tokio::io::AsyncRead;

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

pub struct OpenedBytes {
    pub stream: ByteStream,
    pub total: Option<u64>,
}

impl fmt::Debug for OpenedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedBytes")
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ByteSource: Send + Sync + fmt::Debug {
    fn mime_type(&self) -> &str;
    async fn open(&self) -> io::Result<OpenedBytes>;
}

#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.as_bytes(), "text/plain")
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(bytes, DEFAULT_MIME_TYPE)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[async_trait]
impl ByteSource for Blob {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn open(&self) -> io::Result<OpenedBytes> {
        Ok(OpenedBytes {
            total: Some(self.bytes.len() as u64),
            stream: Box::new(Cursor::new(Arc::clone(&self.bytes))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    path: PathBuf,
    mime_type: String,
}

impl FileBlob {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime_guess::from_path(&path)
            .first_raw()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        Self { path, mime_type }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    pub async fn last_modified(&self) -> io::Result<DateTime<Utc>> {
        let modified = tokio::fs::metadata(&self.path).await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[async_trait]
impl ByteSource for FileBlob {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn open(&self) -> io::Result<OpenedBytes> {
        let file = tokio::fs::File::open(&self.path).await?;
        let metadata = file.metadata().await?;
        // Pipes and character devices report a length of zero.
        let total = metadata.is_file().then(|| metadata.len());
        Ok(OpenedBytes {
            stream: Box::new(file),
            total,
        })
    }
}
