//! Input handling: turn a path, URL or byte buffer into an [`Upload`].
//!
//! An upload is the unit of work for one pipeline run: the original bytes
//! (written to disk unchanged if filing succeeds) plus the name the user
//! gave the file. We validate the PDF magic bytes (`%PDF`) and the size
//! limit before any rasterising so obviously bad input fails fast with a
//! `DecodeError` instead of an opaque rasteriser message.

use crate::error::FileError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// PDF magic bytes.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Fallback name for uploads without a usable file name.
const DEFAULT_UPLOAD_NAME: &str = "certificate.pdf";

/// One uploaded certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    /// Name as supplied by the user (may include directories; only the
    /// final component is ever used for the stored file).
    pub file_name: String,
    /// Original PDF bytes.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an upload from a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, FileError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FileError::filesystem(path, &e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self { file_name, bytes })
    }

    /// Download an upload from an HTTP/HTTPS URL.
    ///
    /// The body is read in chunks and abandoned as soon as it passes
    /// `max_bytes`; an advertised `Content-Length` over the limit fails before
    /// any of the body is read.
    pub async fn fetch(url: &str, timeout_secs: u64, max_bytes: u64) -> Result<Self, FileError> {
        info!("Downloading certificate from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FileError::decode(format!("HTTP client: {e}")))?;

        let failed = |e: reqwest::Error| {
            if e.is_timeout() {
                FileError::decode(format!("download of '{url}' timed out after {timeout_secs}s"))
            } else {
                FileError::decode(format!("download of '{url}' failed: {e}"))
            }
        };

        let mut response = client.get(url).send().await.map_err(failed)?;

        if !response.status().is_success() {
            return Err(FileError::decode(format!(
                "download of '{url}' failed: HTTP {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(oversize(len, max_bytes));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(failed)? {
            let len = (bytes.len() + chunk.len()) as u64;
            if len > max_bytes {
                return Err(oversize(len, max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!("Downloaded {} ({} bytes)", url, bytes.len());

        Ok(Self {
            file_name: filename_from_url(url),
            bytes,
        })
    }

    /// Final path component of the supplied name.
    pub fn base_name(&self) -> String {
        // Uploaded names may come from Windows clients.
        let normalised = self.file_name.replace('\\', "/");
        Path::new(&normalised)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string())
    }
}

/// A user-supplied input: local path or URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Url(String),
}

impl InputSource {
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            InputSource::Url(input.to_string())
        } else {
            InputSource::Local(PathBuf::from(input))
        }
    }

    /// Display name used in reports when loading fails.
    pub fn display_name(&self) -> String {
        match self {
            InputSource::Local(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            InputSource::Url(u) => filename_from_url(u),
        }
    }

    /// Read or download the input. `max_bytes` bounds downloads only; local
    /// files are size-checked by [`validate`].
    pub async fn load(&self, timeout_secs: u64, max_bytes: u64) -> Result<Upload, FileError> {
        match self {
            InputSource::Local(p) => Upload::from_path(p).await,
            InputSource::Url(u) => Upload::fetch(u, timeout_secs, max_bytes).await,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject uploads that cannot possibly be a certificate PDF.
pub fn validate(upload: &Upload, max_bytes: u64) -> Result<(), FileError> {
    let len = upload.bytes.len() as u64;
    if len == 0 {
        return Err(FileError::decode("file is empty"));
    }
    if len > max_bytes {
        return Err(oversize(len, max_bytes));
    }
    if !upload.bytes.starts_with(PDF_MAGIC) {
        let magic: Vec<u8> = upload.bytes.iter().take(4).copied().collect();
        return Err(FileError::decode(format!(
            "not a PDF (first bytes: {magic:?})"
        )));
    }
    Ok(())
}

fn oversize(len: u64, max_bytes: u64) -> FileError {
    FileError::decode(format!(
        "file size ({:.1}MB) exceeds maximum allowed size ({:.0}MB)",
        len as f64 / (1024.0 * 1024.0),
        max_bytes as f64 / (1024.0 * 1024.0),
    ))
}

/// Extract a reasonable file name from a URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
