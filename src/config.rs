//! Configuration types for certificate filing.
//!
//! All filing behaviour is controlled through [`FilingConfig`], built via its
//! [`FilingConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config between the CLI, tests and library callers, and to log
//! exactly what a batch ran with.

use crate::error::CertFilerError;
use crate::pipeline::classify::Classifier;
use crate::pipeline::render::Rasterizer;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default root under which company folders are created.
pub const DEFAULT_OUTPUT_DIR: &str = "certificates";

/// Default Gemini model used when only `GEMINI_API_KEY` is present.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default OpenAI model used when only `OPENAI_API_KEY` is present.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";

/// Default Anthropic model for `--provider anthropic` without `--model`.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// Default Ollama model for `--provider ollama` without `--model`.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2-vision";

/// Upper bound for [`FilingConfigBuilder::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a certificate-filing batch.
///
/// Built via [`FilingConfig::builder()`] or using [`FilingConfig::default()`].
///
/// # Example
/// ```rust
/// use certfiler::FilingConfig;
///
/// let config = FilingConfig::builder()
///     .output_dir("sorted")
///     .dpi(150)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.output_dir.to_str(), Some("sorted"));
/// ```
#[derive(Clone)]
pub struct FilingConfig {
    /// Root directory for company folders. Default: `certificates`.
    pub output_dir: PathBuf,

    /// Rendering DPI used by the rasteriser. Range: 72–400. Default: 150.
    ///
    /// Certificates carry large type; 150 DPI keeps the issuer's name legible
    /// while the encoded image stays small.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Number of leading pages to rasterise. Default: 2.
    ///
    /// Only the first page is sent to the classifier; the second render
    /// catches documents whose first page fails to rasterise as blank.
    pub render_pages: usize,

    /// Encoding of the image sent to the classifier. Default: JPEG q85.
    pub image_format: PageImageFormat,

    /// Which rasteriser implementation to use. Default: pdfium.
    pub raster_backend: RasterBackend,

    /// Explicit path to libpdfium. Overrides `PDFIUM_LIB_PATH` and the cache.
    pub pdfium_library: Option<PathBuf>,

    /// PDF user password for encrypted certificates.
    pub password: Option<String>,

    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1-nano".
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed classifier. Takes precedence over every provider field.
    pub classifier: Option<Arc<dyn Classifier>>,

    /// Pre-constructed rasteriser. Takes precedence over `raster_backend`.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Custom classification prompt. If None, uses the built-in default.
    pub prompt: Option<String>,

    /// Sampling temperature for the classifier call. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 64.
    ///
    /// A company name is a handful of tokens; the cap keeps a chatty model
    /// from burning budget on explanations.
    pub max_tokens: usize,

    /// Retry attempts on a failed classifier call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 1000.
    pub retry_backoff_ms: u64,

    /// Largest accepted upload in megabytes. Default: 200.
    pub max_file_size_mb: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FilingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            dpi: 150,
            max_rendered_pixels: 2000,
            render_pages: 2,
            image_format: PageImageFormat::default(),
            raster_backend: RasterBackend::default(),
            pdfium_library: None,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            classifier: None,
            rasterizer: None,
            prompt: None,
            temperature: 0.1,
            max_tokens: 64,
            max_retries: 0,
            retry_backoff_ms: 1000,
            max_file_size_mb: 200,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FilingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilingConfig")
            .field("output_dir", &self.output_dir)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("render_pages", &self.render_pages)
            .field("image_format", &self.image_format)
            .field("raster_backend", &self.raster_backend)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("classifier", &self.classifier.as_ref().map(|_| "<dyn Classifier>"))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .finish()
    }
}

impl FilingConfig {
    /// Create a new builder for `FilingConfig`.
    pub fn builder() -> FilingConfigBuilder {
        FilingConfigBuilder {
            config: Self::default(),
        }
    }

    /// Upload size limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Builder for [`FilingConfig`].
pub struct FilingConfigBuilder {
    config: FilingConfig,
}

impl fmt::Debug for FilingConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilingConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl FilingConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn render_pages(mut self, n: usize) -> Self {
        self.config.render_pages = n.max(1);
        self
    }

    pub fn image_format(mut self, format: PageImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn raster_backend(mut self, backend: RasterBackend) -> Self {
        self.config.raster_backend = backend;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.config.classifier = Some(classifier);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Clamped to [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_mb = mb;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FilingConfig, CertFilerError> {
        let c = &self.config;
        if c.output_dir.as_os_str().is_empty() {
            return Err(CertFilerError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(CertFilerError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_file_size_mb == 0 {
            return Err(CertFilerError::InvalidConfig(
                "Maximum file size must be ≥ 1 MB".into(),
            ));
        }
        if let PageImageFormat::Jpeg { quality } = c.image_format {
            if quality == 0 || quality > 100 {
                return Err(CertFilerError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image encoding for the page sent to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageImageFormat {
    /// Lossless; larger request bodies.
    Png,
    /// Lossy with the given quality (1–100). Default: 85.
    Jpeg { quality: u8 },
}

impl Default for PageImageFormat {
    fn default() -> Self {
        PageImageFormat::Jpeg { quality: 85 }
    }
}

impl PageImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            PageImageFormat::Png => "image/png",
            PageImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Rasteriser implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterBackend {
    /// In-process pdfium via pdfium-render. (default)
    #[default]
    Pdfium,
    /// poppler's `pdftoppm` executable.
    Poppler,
}
