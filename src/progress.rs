//! Progress-callback trait for per-certificate filing events.
//!
//! Inject an [`Arc<dyn FilingProgressCallback>`] via
//! [`crate::config::FilingConfigBuilder::progress_callback`] to hear about
//! each upload as the batch works through it. The CLI uses this to drive its
//! progress bar; a web front end could forward the same events to a socket.
//!
//! # Example
//!
//! ```rust
//! use certfiler::{FilingConfig, FilingProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     filed: AtomicUsize,
//! }
//!
//! impl FilingProgressCallback for CountingCallback {
//!     fn on_file_filed(&self, index: usize, total: usize, file_name: &str, company: &str) {
//!         self.filed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} → {}", index, total, file_name, company);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { filed: AtomicUsize::new(0) });
//!
//! let config = FilingConfig::builder()
//!     .progress_callback(counter as Arc<dyn FilingProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the filing pipeline as it processes each upload.
///
/// Uploads are processed one at a time, so calls never overlap for a single
/// batch. All methods default to no-ops.
pub trait FilingProgressCallback: Send + Sync {
    /// Called once before the first upload is touched.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before an upload is validated.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the batch
    /// * `total`: batch size
    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        let _ = (index, total, file_name);
    }

    /// Called when the model has named the issuer, before the file is written.
    fn on_file_classified(&self, index: usize, total: usize, file_name: &str, company: &str) {
        let _ = (index, total, file_name, company);
    }

    /// Called after the certificate has been written under its company folder.
    fn on_file_filed(&self, index: usize, total: usize, file_name: &str, company: &str) {
        let _ = (index, total, file_name, company);
    }

    /// Called when an upload fails at any stage.
    ///
    /// `error` is the display form of the [`crate::FileError`].
    fn on_file_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        let _ = (index, total, file_name, error);
    }

    /// Called once after every upload has been attempted.
    fn on_batch_complete(&self, total_files: usize, filed: usize, output_dir: &Path) {
        let _ = (total_files, filed, output_dir);
    }
}

/// Callback that ignores every event; the default when none is configured.
pub struct NoopProgressCallback;

impl FilingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FilingConfig`].
pub type ProgressCallback = Arc<dyn FilingProgressCallback>;
