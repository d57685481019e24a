//! Batch filing entry points.
//!
//! Every upload goes through the same linear pipeline:
//!
//! ```text
//! validate → render → encode → classify → parse → sanitise → store
//! ```
//!
//! Uploads are handled strictly one after another. A failure at any stage
//! becomes a [`FileError`] in that upload's [`FileReport`] and the batch
//! moves on; only problems that would sink every file (bad configuration,
//! no provider, unusable output root) are returned as [`CertFilerError`].

use crate::config::FilingConfig;
use crate::error::{CertFilerError, FileError};
use crate::output::{BatchReport, FileOutcome, FileReport, StageTimings};
use crate::pipeline::classify::{parse_company_name, resolve_classifier, Classifier};
use crate::pipeline::encode::encode_page;
use crate::pipeline::input::{validate, InputSource, Upload};
use crate::pipeline::naming::sanitize_company_name;
use crate::pipeline::render::{build_rasterizer, render_pages, Rasterizer};
use crate::pipeline::store::store_certificate;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// File a batch of in-memory uploads.
///
/// # Returns
/// `Ok(BatchReport)` with one entry per upload, in order, even when every
/// upload failed (check `report.stats.failed`).
///
/// # Errors
/// Returns `Err(CertFilerError)` only for fatal problems detected before the
/// first upload is touched:
/// - no classifier provider could be configured
/// - the output root exists and is not a directory
///
/// # Example
/// ```rust,no_run
/// use certfiler::{file_batch, FilingConfig, Upload};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let upload = Upload::new("award.pdf", std::fs::read("award.pdf")?);
/// let report = file_batch(vec![upload], &FilingConfig::default()).await?;
/// for (company, files) in report.by_company() {
///     println!("{company}: {} file(s)", files.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn file_batch(
    uploads: Vec<Upload>,
    config: &FilingConfig,
) -> Result<BatchReport, CertFilerError> {
    let batch_start = Instant::now();
    let filer = Filer::new(config)?;
    let total = uploads.len();
    info!("Filing {} certificate(s) into {}", total, config.output_dir.display());

    filer.batch_start(total);
    let mut reports = Vec::with_capacity(total);
    for (i, upload) in uploads.iter().enumerate() {
        reports.push(filer.file_one(upload, i + 1, total).await);
    }

    Ok(filer.finish(reports, batch_start))
}

/// File a batch of local paths and/or URLs.
///
/// Inputs are loaded one at a time inside the batch loop, so a missing file
/// or failed download is reported against that input alone.
pub async fn file_inputs(
    inputs: &[InputSource],
    config: &FilingConfig,
) -> Result<BatchReport, CertFilerError> {
    let batch_start = Instant::now();
    let filer = Filer::new(config)?;
    let total = inputs.len();
    info!("Filing {} input(s) into {}", total, config.output_dir.display());

    filer.batch_start(total);
    let mut reports = Vec::with_capacity(total);
    for (i, input) in inputs.iter().enumerate() {
        let index = i + 1;
        let report = match input
            .load(config.download_timeout_secs, config.max_file_size_bytes())
            .await
        {
            Ok(upload) => filer.file_one(&upload, index, total).await,
            Err(error) => {
                let started = Instant::now();
                let name = input.display_name();
                filer.file_start(index, total, &name);
                filer.failed(name, error, index, total, StageTimings::default(), started)
            }
        };
        reports.push(report);
    }

    Ok(filer.finish(reports, batch_start))
}

/// File a single upload.
///
/// Convenience wrapper for callers that handle one certificate at a time;
/// progress callbacks see a batch of one.
pub async fn file_certificate(
    upload: &Upload,
    config: &FilingConfig,
) -> Result<FileReport, CertFilerError> {
    let filer = Filer::new(config)?;
    Ok(filer.file_one(upload, 1, 1).await)
}

/// Synchronous wrapper around [`file_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn file_batch_sync(
    uploads: Vec<Upload>,
    config: &FilingConfig,
) -> Result<BatchReport, CertFilerError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CertFilerError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(file_batch(uploads, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolved services for one batch.
struct Filer<'a> {
    config: &'a FilingConfig,
    rasterizer: Arc<dyn Rasterizer>,
    classifier: Arc<dyn Classifier>,
}

impl<'a> Filer<'a> {
    fn new(config: &'a FilingConfig) -> Result<Self, CertFilerError> {
        check_output_root(&config.output_dir)?;
        let classifier = resolve_classifier(config)?;
        let rasterizer = build_rasterizer(config);
        debug!("Rasteriser: {}", rasterizer.name());
        Ok(Self {
            config,
            rasterizer,
            classifier,
        })
    }

    fn batch_start(&self, total: usize) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }
    }

    fn file_start(&self, index: usize, total: usize, name: &str) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_start(index, total, name);
        }
    }

    async fn file_one(&self, upload: &Upload, index: usize, total: usize) -> FileReport {
        let started = Instant::now();
        let name = upload.base_name();
        self.file_start(index, total, &name);
        debug!("[{}/{}] {}: {} bytes", index, total, name, upload.bytes.len());

        let mut timings = StageTimings::default();
        match self.run_stages(upload, &name, index, total, &mut timings).await {
            Ok((company, path)) => {
                timings.total_ms = started.elapsed().as_millis() as u64;
                info!(
                    "[{}/{}] {} → {} ({}ms)",
                    index,
                    total,
                    name,
                    path.display(),
                    timings.total_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_file_filed(index, total, &name, &company);
                }
                FileReport {
                    file_name: name,
                    outcome: FileOutcome::Filed { company, path },
                    timings,
                }
            }
            Err(error) => self.failed(name, error, index, total, timings, started),
        }
    }

    /// Run every stage for one upload, recording how long each took.
    async fn run_stages(
        &self,
        upload: &Upload,
        name: &str,
        index: usize,
        total: usize,
        timings: &mut StageTimings,
    ) -> Result<(String, PathBuf), FileError> {
        // ── Render ───────────────────────────────────────────────────────
        let t = Instant::now();
        validate(upload, self.config.max_file_size_bytes())?;
        let pdf: Arc<[u8]> = Arc::from(upload.bytes.as_slice());
        let pages = render_pages(
            Arc::clone(&self.rasterizer),
            pdf,
            self.config.render_pages,
        )
        .await?;
        let page = pick_page(&pages)
            .ok_or_else(|| FileError::decode("rasteriser returned no pages"))?;
        let image = encode_page(page, self.config.image_format)
            .map_err(|e| FileError::decode(format!("image encoding failed: {e}")))?;
        drop(pages);
        timings.render_ms = t.elapsed().as_millis() as u64;

        // ── Classify ─────────────────────────────────────────────────────
        let t = Instant::now();
        let raw = self.classifier.classify(image, name).await?;
        debug!("{}: model answered {:?}", name, raw);
        let company = parse_company_name(&raw)?;
        let folder = sanitize_company_name(&company).ok_or_else(|| {
            FileError::classification(format!(
                "company name {company:?} has no characters usable in a folder name"
            ))
        })?;
        timings.classify_ms = t.elapsed().as_millis() as u64;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_classified(index, total, name, &folder);
        }

        // ── Store ────────────────────────────────────────────────────────
        let t = Instant::now();
        let path = store_certificate(&self.config.output_dir, &folder, name, &upload.bytes).await?;
        timings.store_ms = t.elapsed().as_millis() as u64;

        Ok((folder, path))
    }

    fn failed(
        &self,
        name: String,
        error: FileError,
        index: usize,
        total: usize,
        mut timings: StageTimings,
        started: Instant,
    ) -> FileReport {
        timings.total_ms = started.elapsed().as_millis() as u64;
        warn!("[{}/{}] {}: {}", index, total, name, error);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_error(index, total, &name, &error.to_string());
        }
        FileReport {
            file_name: name,
            outcome: FileOutcome::Failed { error },
            timings,
        }
    }

    fn finish(&self, reports: Vec<FileReport>, batch_start: Instant) -> BatchReport {
        let report =
            BatchReport::from_files(reports, batch_start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {}/{} filed, {}ms total",
            report.stats.filed, report.stats.total_files, report.stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(
                report.stats.total_files,
                report.stats.filed,
                &self.config.output_dir,
            );
        }
        report
    }
}

/// The output root may be missing (it is created on first filing) but must
/// not be something other than a directory.
fn check_output_root(root: &Path) -> Result<(), CertFilerError> {
    match std::fs::metadata(root) {
        Ok(meta) if !meta.is_dir() => Err(CertFilerError::OutputDirUnusable {
            path: root.to_path_buf(),
            detail: "exists and is not a directory".into(),
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CertFilerError::OutputDirUnusable {
            path: root.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

/// First page with visible content, else the first page.
///
/// Some generators emit an empty cover before the certificate itself.
fn pick_page(pages: &[DynamicImage]) -> Option<&DynamicImage> {
    pages
        .iter()
        .find(|p| !is_blank(p))
        .or_else(|| pages.first())
}

fn is_blank(img: &DynamicImage) -> bool {
    let luma = img.to_luma8();
    let mut pixels = luma.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}
