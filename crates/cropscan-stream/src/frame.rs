//! Frame sources.
//!
//! A frame source hands the session one still image per capture. Sources:
//! - `StaticSource`: the same in-memory image every time
//! - `FileSource`: re-reads one file per capture (a camera daemon keeps
//!   overwriting it with the latest snapshot)
//! - `DirectorySource`: cycles through the images of a directory in name order
//!
//! Sources never retry. A failed capture is reported to the session, which
//! skips that tick and keeps its timer running.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::encoding::encode_data_url;
use crate::error::{StreamError, StreamResult};

/// One captured still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub mime: String,
}

impl Frame {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encode as the wire payload (`data:<mime>;base64,...`).
    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.mime, &self.data)
    }
}

/// Captures a still image on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Capture one frame.
    async fn capture_frame(&self) -> StreamResult<Frame>;
}

/// Guess an image mime type from a file extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Returns the same frame on every capture.
pub struct StaticSource {
    frame: Frame,
}

impl StaticSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }
}

#[async_trait]
impl FrameSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn capture_frame(&self) -> StreamResult<Frame> {
        Ok(self.frame.clone())
    }
}

/// Re-reads a single image file on every capture.
pub struct FileSource {
    path: PathBuf,
    mime: &'static str,
    label: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> StreamResult<Self> {
        let path = path.into();
        let mime = mime_for_path(&path).ok_or_else(|| {
            StreamError::invalid_source(format!("unsupported image type: {}", path.display()))
        })?;
        let label = format!("file:{}", path.display());
        Ok(Self { path, mime, label })
    }
}

#[async_trait]
impl FrameSource for FileSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn capture_frame(&self) -> StreamResult<Frame> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| StreamError::capture(format!("{}: {}", self.path.display(), e)))?;
        if data.is_empty() {
            return Err(StreamError::capture(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        Ok(Frame::new(data, self.mime))
    }
}

/// Cycles through the images of a directory.
pub struct DirectorySource {
    files: Vec<(PathBuf, &'static str)>,
    cursor: AtomicUsize,
    label: String,
}

impl DirectorySource {
    /// Scan `dir` for image files. Fails if it holds none.
    pub async fn scan(dir: impl AsRef<Path>) -> StreamResult<Self> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| StreamError::invalid_source(format!("{}: {}", dir.display(), e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StreamError::invalid_source(format!("{}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            if let Some(mime) = mime_for_path(&path) {
                files.push((path, mime));
            }
        }

        if files.is_empty() {
            return Err(StreamError::invalid_source(format!(
                "no images found in {}",
                dir.display()
            )));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        debug!("Directory source {} holds {} images", dir.display(), files.len());

        Ok(Self {
            files,
            cursor: AtomicUsize::new(0),
            label: format!("dir:{}", dir.display()),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn capture_frame(&self) -> StreamResult<Frame> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.files.len();
        let (path, mime) = &self.files[index];
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StreamError::capture(format!("{}: {}", path.display(), e)))?;
        Ok(Frame::new(data, *mime))
    }
}

/// Open a directory or a single image file as a frame source.
pub async fn open_source(path: impl AsRef<Path>) -> StreamResult<Arc<dyn FrameSource>> {
    let path = path.as_ref();
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| StreamError::invalid_source(format!("{}: {}", path.display(), e)))?;

    if metadata.is_dir() {
        Ok(Arc::new(DirectorySource::scan(path).await?))
    } else {
        Ok(Arc::new(FileSource::new(path)?))
    }
}
