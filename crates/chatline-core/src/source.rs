//! Resolving user-picked files into bytes plus metadata

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::ImageFormat;
use tokio::io::{AsyncRead, AsyncReadExt};

/// What a file source knows about a picked file before reading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub mime_type: Option<String>,
    pub display_name: Option<String>,
    pub size: Option<u64>,
}

pub struct OpenedFile {
    pub meta: FileMeta,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl OpenedFile {
    pub fn new(meta: FileMeta, reader: Box<dyn AsyncRead + Send + Unpin>) -> Self {
        Self { meta, reader }
    }

    /// Read the whole stream
    pub async fn read_all(mut self) -> Result<(FileMeta, Vec<u8>)> {
        let mut bytes = Vec::with_capacity(self.meta.size.unwrap_or(0) as usize);
        self.reader
            .read_to_end(&mut bytes)
            .await
            .context("Failed to read attachment")?;
        Ok((self.meta, bytes))
    }
}

/// Turns an opaque content reference into a readable file
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn open(&self, reference: &str) -> Result<OpenedFile>;
}

/// Files on the local filesystem, referenced by path
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSource;

#[async_trait]
impl FileSource for LocalFileSource {
    async fn open(&self, reference: &str) -> Result<OpenedFile> {
        let path = Path::new(reference);
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {:?}", path))?;
        let size = file.metadata().await.ok().map(|m| m.len());

        let meta = FileMeta {
            mime_type: Some(guess_mime_type(path).to_string()),
            display_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            size,
        };
        Ok(OpenedFile::new(meta, Box::new(file)))
    }
}

/// MIME type from the file extension
pub fn guess_mime_type(path: &Path) -> &'static str {
    if let Ok(format) = ImageFormat::from_path(path) {
        return format.to_mime_type();
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}
