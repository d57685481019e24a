//! PDF rasterisation: render the leading pages of a certificate to images.
//!
//! Two backends sit behind the [`Rasterizer`] trait:
//!
//! * [`PdfiumRasterizer`]: in-process pdfium via `pdfium-render`, with the
//!   shared library located (or downloaded once) through `pdfium-auto`.
//! * [`PopplerRasterizer`]: poppler's `pdftoppm` executable, for hosts where
//!   poppler-utils is already installed.
//!
//! ## Threading
//!
//! pdfium uses thread-local state and is not safe to drive from async code,
//! and `pdftoppm` is a blocking child process. [`render_pages`] moves either
//! onto tokio's blocking pool so the runtime's workers never stall.
//!
//! ## Binding
//!
//! A `Pdfium` handle is not `Send` without pdfium-render's experimental
//! `sync` feature, so it cannot live inside a shared rasteriser. Binding
//! inside the blocking task keeps it on one thread, and a missing library
//! surfaces as a per-file `DecodeError` instead of aborting the batch.

use crate::config::{FilingConfig, RasterBackend};
use crate::error::{CertFilerError, FileError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info};

/// Converts PDF bytes into page images.
///
/// Implementations block; call them through [`render_pages`].
pub trait Rasterizer: Send + Sync {
    /// Render at most `max_pages` leading pages, in page order.
    ///
    /// Returns at least one image on success.
    fn rasterize(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, FileError>;

    /// Backend name for log lines.
    fn name(&self) -> &'static str;
}

/// Rasterise on the blocking pool.
pub async fn render_pages(
    rasterizer: Arc<dyn Rasterizer>,
    pdf: Arc<[u8]>,
    max_pages: usize,
) -> Result<Vec<DynamicImage>, FileError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, max_pages))
        .await
        .map_err(|e| FileError::decode(format!("render task panicked: {e}")))?
}

/// Build the rasteriser selected by `config`.
pub fn build_rasterizer(config: &FilingConfig) -> Arc<dyn Rasterizer> {
    if let Some(ref r) = config.rasterizer {
        return Arc::clone(r);
    }
    match config.raster_backend {
        RasterBackend::Pdfium => Arc::new(PdfiumRasterizer {
            library: config.pdfium_library.clone(),
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
        }),
        RasterBackend::Poppler => Arc::new(PopplerRasterizer {
            program: PathBuf::from(PDFTOPPM),
            dpi: config.dpi,
            password: config.password.clone(),
        }),
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// In-process rasteriser backed by libpdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Explicit library file; otherwise `PDFIUM_LIB_PATH`, the pdfium-auto
    /// cache (downloading on first use), then the system library.
    pub library: Option<PathBuf>,
    pub dpi: u32,
    /// Cap on either rendered dimension.
    pub max_pixels: u32,
    pub password: Option<String>,
}

impl PdfiumRasterizer {
    fn bind(&self) -> Result<Pdfium, String> {
        if let Some(ref path) = self.library {
            return pdfium_auto::bind_pdfium_from_path(path).map_err(|e| e.to_string());
        }

        let auto_err = match pdfium_auto::ensure_pdfium_library(None) {
            Ok(path) => match pdfium_auto::bind_pdfium_from_path(&path) {
                Ok(pdfium) => return Ok(pdfium),
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| format!("{auto_err}; system library: {e:?}"))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, FileError> {
        let pdfium = self
            .bind()
            .map_err(|e| FileError::decode(format!("pdfium unavailable: {e}")))?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, self.password.as_deref())
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if self.password.is_some() {
                        FileError::decode("wrong password for encrypted PDF")
                    } else {
                        FileError::decode("PDF is encrypted and requires a password")
                    }
                } else {
                    FileError::decode(format!("corrupt PDF: {err_str}"))
                }
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(FileError::decode("no pages found in PDF"));
        }
        debug!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let wanted = total_pages.min(max_pages.max(1));
        let mut results = Vec::with_capacity(wanted);

        for idx in 0..wanted {
            let page = pages
                .get(idx as u16)
                .map_err(|e| FileError::decode(format!("page {}: {:?}", idx + 1, e)))?;

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| FileError::decode(format!("page {}: {:?}", idx + 1, e)))?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            results.push(image);
        }

        Ok(results)
    }

    fn name(&self) -> &'static str {
        "pdfium"
    }
}

/// Make sure a pdfium library is available before a batch starts.
///
/// `on_progress` receives `(bytes_downloaded, total)` while the library is
/// fetched on first use. Does nothing when an explicit library is configured.
pub fn prepare_pdfium(
    library: Option<&Path>,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<(), CertFilerError> {
    if let Some(path) = library {
        if !path.exists() {
            return Err(CertFilerError::PdfiumBindingFailed(format!(
                "'{}' does not exist",
                path.display()
            )));
        }
        return Ok(());
    }
    let path = pdfium_auto::ensure_pdfium_library(on_progress)
        .map_err(|e| CertFilerError::PdfiumBindingFailed(e.to_string()))?;
    info!("Using pdfium at {}", path.display());
    Ok(())
}

// ── poppler ──────────────────────────────────────────────────────────────

/// Default poppler executable name.
pub const PDFTOPPM: &str = "pdftoppm";

/// Rasteriser that shells out to poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    pub program: PathBuf,
    pub dpi: u32,
    pub password: Option<String>,
}

impl Rasterizer for PopplerRasterizer {
    fn rasterize(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, FileError> {
        let work = tempfile::tempdir()
            .map_err(|e| FileError::decode(format!("temp dir for pdftoppm: {e}")))?;
        let input = work.path().join("input.pdf");
        std::fs::write(&input, pdf)
            .map_err(|e| FileError::decode(format!("temp file for pdftoppm: {e}")))?;
        let prefix = work.path().join("page");

        let mut cmd = Command::new(&self.program);
        cmd.arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(max_pages.max(1).to_string());
        if let Some(ref pwd) = self.password {
            cmd.arg("-upw").arg(pwd);
        }
        cmd.arg(&input).arg(&prefix);

        let output = cmd.output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                FileError::decode(format!(
                    "'{}' not found; install poppler-utils",
                    self.program.display()
                ))
            } else {
                FileError::decode(format!("failed to run pdftoppm: {e}"))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FileError::decode(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut pages = rendered_page_files(work.path())
            .map_err(|e| FileError::decode(format!("reading pdftoppm output: {e}")))?;
        pages.sort_by_key(|(n, _)| *n);

        if pages.is_empty() {
            return Err(FileError::decode("no pages found in PDF"));
        }

        pages
            .into_iter()
            .map(|(n, path)| {
                image::open(&path)
                    .map_err(|e| FileError::decode(format!("page {n}: {e}")))
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "poppler"
    }
}

/// `page-1.png`, `page-01.png`, … → `(page_number, path)`.
fn rendered_page_files(dir: &Path) -> std::io::Result<Vec<(usize, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(n) = page_number(name) {
            found.push((n, path));
        }
    }
    Ok(found)
}

fn page_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("page-")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}
