//! Error types for the certfiler library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CertFilerError`]: **Fatal**: the batch cannot start at all
//!   (invalid configuration, no classifier provider, pdfium missing).
//!   Returned as `Err(CertFilerError)` from the top-level `file_*` functions.
//!
//! * [`FileError`]: **Non-fatal**: a single certificate failed (corrupt PDF,
//!   unusable model answer, unwritable folder) but the rest of the batch is
//!   fine. Stored inside [`crate::output::FileReport`] so one bad upload never
//!   costs the others.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the certfiler library.
///
/// Per-certificate failures use [`FileError`] and are stored in
/// [`crate::output::FileReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum CertFilerError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Classifier errors ─────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Rasteriser errors ─────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
If the automatic download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Use --backend poppler if pdftoppm is installed.\n"
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The output root exists but is not a directory.
    #[error("Output directory '{path}' is not usable: {detail}")]
    OutputDirUnusable { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single certificate.
///
/// The batch always continues with the next file.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileError {
    /// The upload is not a readable PDF, or the rasteriser could not run.
    #[error("decode error: {detail}")]
    Decode { detail: String },

    /// The classifier call failed or returned nothing usable.
    #[error("classification error: {detail}")]
    Classification { detail: String },

    /// The input could not be read or the certificate could not be written.
    #[error("filesystem error at '{}': {detail}", path.display())]
    Filesystem { path: PathBuf, detail: String },
}

impl FileError {
    pub fn decode(detail: impl Into<String>) -> Self {
        FileError::Decode {
            detail: detail.into(),
        }
    }

    pub fn classification(detail: impl Into<String>) -> Self {
        FileError::Classification {
            detail: detail.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        FileError::Filesystem {
            path: path.into(),
            detail: source.to_string(),
        }
    }

    /// Short label used in reports and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::Decode { .. } => "DecodeError",
            FileError::Classification { .. } => "ClassificationError",
            FileError::Filesystem { .. } => "FilesystemError",
        }
    }
}
