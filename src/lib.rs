//! # certfiler
//!
//! File PDF certificates into per-company folders using a Vision Language
//! Model (VLM).
//!
//! Certificates from training providers, vendors and conferences all look
//! different and rarely carry machine-readable issuer metadata. This crate
//! renders the first page of each certificate, asks a vision model which
//! company issued it, and writes the original PDF, unchanged, to
//! `certificates/<Company>/`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Input     bytes + file name; size and %PDF checks
//!  ├─ 2. Render    leading pages via pdfium or pdftoppm (spawn_blocking)
//!  ├─ 3. Encode    JPEG/PNG → base64 ImageData
//!  ├─ 4. Classify  one vision call: "who issued this?"
//!  ├─ 5. Name      answer → safe folder name
//!  └─ 6. Store     original bytes → <output_dir>/<Company>/<name>[_N].pdf
//! ```
//!
//! Uploads are processed one at a time. A failure in any stage is recorded
//! against that upload and the batch continues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use certfiler::{file_batch, FilingConfig, Upload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = FilingConfig::default();
//!     let upload = Upload::from_path("award.pdf").await?;
//!     let report = file_batch(vec![upload], &config).await?;
//!     for file in &report.files {
//!         match file.stored_path() {
//!             Some(path) => println!("{} → {}", file.file_name, path.display()),
//!             None => eprintln!("{} failed", file.file_name),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `certfiler` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! certfiler = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod filing;
pub mod inventory;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FilingConfig, FilingConfigBuilder, PageImageFormat, RasterBackend};
pub use error::{CertFilerError, FileError};
pub use filing::{file_batch, file_batch_sync, file_certificate, file_inputs};
pub use inventory::{scan, CompanyFolder, StoredCertificate};
pub use output::{BatchReport, BatchStats, FileOutcome, FileReport, StageTimings};
pub use pipeline::classify::{Classifier, VisionClassifier};
pub use pipeline::input::{InputSource, Upload};
pub use pipeline::render::{prepare_pdfium, Rasterizer};
pub use progress::{FilingProgressCallback, NoopProgressCallback, ProgressCallback};
