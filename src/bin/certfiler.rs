//! CLI binary for certfiler.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `FilingConfig`, drives a progress bar and prints the batch report.

use anyhow::{Context, Result};
use certfiler::{
    file_inputs, prepare_pdfium, scan, BatchReport, CompanyFolder, FilingConfig,
    FilingProgressCallback, InputSource, PageImageFormat, ProgressCallback, RasterBackend,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch, one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    file_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Filing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl FilingProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Filing {total_files} certificate(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, file_name: &str) {
        if let Ok(mut started) = self.file_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(file_name.to_string());
    }

    fn on_file_classified(&self, _index: usize, _total: usize, file_name: &str, company: &str) {
        self.bar.set_message(format!("{file_name} → {company}"));
    }

    fn on_file_filed(&self, index: usize, total: usize, file_name: &str, company: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  →  {}  {}",
            green("✓"),
            index,
            total,
            file_name,
            bold(company),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per file.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            file_name,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, filed: usize, output_dir: &Path) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);

        if failed == 0 {
            eprintln!(
                "{} {} certificate(s) filed under {}",
                green("✔"),
                bold(&filed.to_string()),
                bold(&output_dir.display().to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} certificate(s) filed under {}  ({} failed)",
                if filed == 0 { red("✘") } else { cyan("⚠") },
                bold(&filed.to_string()),
                total_files,
                bold(&output_dir.display().to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # File a few certificates into ./certificates/<Company>/
  certfiler award.pdf course-completion.pdf

  # Choose the output root
  certfiler -o ~/Documents/certs ~/Downloads/*.pdf

  # Use OpenAI instead of Gemini
  certfiler --provider openai --model gpt-4.1-mini award.pdf

  # File a certificate straight from a URL
  certfiler https://example.com/certificates/1234.pdf

  # Render with poppler's pdftoppm instead of pdfium
  certfiler --backend poppler award.pdf

  # Show what has been filed so far
  certfiler --list

  # Machine-readable report
  certfiler --json award.pdf > report.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID (with EDGEQUAKE_LLM_PROVIDER)
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  CERTFILER_*             Every flag, e.g. CERTFILER_OUTPUT_DIR

  Variables are also read from a .env file in the working directory.

EXIT STATUS:
  0 when the batch ran, even if individual certificates failed (they are
  listed in the report). Non-zero only when the batch could not start.
"#;

/// File PDF certificates into per-company folders using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "certfiler",
    version,
    about = "File PDF certificates into per-company folders using a Vision LLM",
    long_about = "Render each PDF certificate, ask a vision model which company issued it, and \
write the original file to <output-dir>/<Company>/. Existing files are never overwritten: a \
name collision gets a numeric suffix.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF paths or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "list")]
    inputs: Vec<String>,

    /// Root directory for company folders.
    #[arg(short, long, env = "CERTFILER_OUTPUT_DIR", default_value = "certificates")]
    output_dir: PathBuf,

    /// List filed certificates under the output directory and exit.
    #[arg(long)]
    list: bool,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, env = "CERTFILER_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "CERTFILER_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set \
          (GEMINI_API_KEY first, then OPENAI_API_KEY). Defaults: gemini → gemini-2.0-flash, \
          openai → gpt-4.1-nano, anthropic → claude-3-5-haiku-latest, \
          ollama → llama3.2-vision. azure needs --model (the deployment name)."
    )]
    provider: Option<String>,

    /// Rasteriser: pdfium (in-process) or poppler (pdftoppm).
    #[arg(long, env = "CERTFILER_BACKEND", value_enum, default_value = "pdfium")]
    backend: BackendArg,

    /// Path to libpdfium (pdfium backend only).
    #[arg(long, env = "CERTFILER_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "CERTFILER_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Leading pages to render per certificate.
    #[arg(long, env = "CERTFILER_RENDER_PAGES", default_value_t = 2)]
    render_pages: usize,

    /// Image encoding sent to the model.
    #[arg(long, env = "CERTFILER_IMAGE_FORMAT", value_enum, default_value = "jpeg")]
    image_format: ImageFormatArg,

    /// JPEG quality (1–100).
    #[arg(long, env = "CERTFILER_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// PDF user password for encrypted certificates.
    #[arg(long, env = "CERTFILER_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom classification prompt.
    #[arg(long, env = "CERTFILER_PROMPT")]
    prompt: Option<PathBuf>,

    /// Max LLM output tokens per certificate.
    #[arg(long, env = "CERTFILER_MAX_TOKENS", default_value_t = 64)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "CERTFILER_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per certificate on LLM failure (at most 10).
    #[arg(long, env = "CERTFILER_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Largest accepted PDF in megabytes.
    #[arg(long, env = "CERTFILER_MAX_FILE_SIZE_MB", default_value_t = 200)]
    max_file_size_mb: u64,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "CERTFILER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the structured JSON report instead of text.
    #[arg(long, env = "CERTFILER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CERTFILER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CERTFILER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the report.
    #[arg(short, long, env = "CERTFILER_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Pdfium,
    Poppler,
}

impl From<BackendArg> for RasterBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Pdfium => RasterBackend::Pdfium,
            BackendArg::Poppler => RasterBackend::Poppler,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageFormatArg {
    Jpeg,
    Png,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inventory mode ───────────────────────────────────────────────────
    if cli.list {
        let folders = scan(&cli.output_dir)
            .await
            .with_context(|| format!("Failed to read {}", cli.output_dir.display()))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&folders).context("Failed to serialise inventory")?
            );
        } else {
            print_inventory(&cli.output_dir, &folders);
        }
        return Ok(());
    }

    // ── Ensure PDFium engine is available ────────────────────────────────
    if matches!(cli.backend, BackendArg::Pdfium) {
        ensure_pdfium(&cli)?;
    }

    // ── Build config and run ─────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn FilingProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let inputs: Vec<InputSource> = cli.inputs.iter().map(|s| InputSource::parse(s)).collect();

    let report = file_inputs(&inputs, &config)
        .await
        .context("Filing failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_report(&report, &config.output_dir, show_progress);
    }

    Ok(())
}

/// Locate libpdfium, downloading it on first use.
fn ensure_pdfium(cli: &Cli) -> Result<()> {
    let explicit = cli.pdfium_lib.as_deref();

    if explicit.is_some() || cli.quiet || pdfium_auto::is_pdfium_cached() {
        return tokio::task::block_in_place(|| prepare_pdfium(explicit, None))
            .context("Failed to locate PDFium engine");
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    // block_in_place lets the callback borrow `bar` without 'static.
    tokio::task::block_in_place(|| {
        prepare_pdfium(
            None,
            Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }),
        )
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `FilingConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<FilingConfig> {
    let image_format = match cli.image_format {
        ImageFormatArg::Png => PageImageFormat::Png,
        ImageFormatArg::Jpeg => PageImageFormat::Jpeg {
            quality: cli.jpeg_quality,
        },
    };

    let mut builder = FilingConfig::builder()
        .output_dir(&cli.output_dir)
        .dpi(cli.dpi)
        .render_pages(cli.render_pages)
        .image_format(image_format)
        .raster_backend(cli.backend.into())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .max_file_size_mb(cli.max_file_size_mb)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_report(report: &BatchReport, output_dir: &Path, progress_shown: bool) {
    // The progress callback already printed per-file lines and a summary.
    if !progress_shown {
        for file in &report.files {
            match (file.stored_path(), file.error()) {
                (Some(path), _) => {
                    println!("{} {} → {}", green("✓"), file.file_name, path.display())
                }
                (None, Some(err)) => {
                    println!("{} {}  {}: {}", red("✗"), file.file_name, err.kind(), err)
                }
                (None, None) => {}
            }
        }
        println!(
            "Filed {}/{} certificate(s) under {} in {}ms",
            report.stats.filed,
            report.stats.total_files,
            output_dir.display(),
            report.stats.total_duration_ms
        );
    }

    let groups = report.by_company();
    if !groups.is_empty() {
        println!();
        for (company, files) in groups {
            println!("{}  {}", bold(company), dim(&format!("({})", files.len())));
            for f in files {
                if let Some(path) = f.stored_path() {
                    println!("    {}", path.display());
                }
            }
        }
    }

    if report.stats.filed > 0 {
        if let Some(stage) = report.stats.slowest_stage() {
            eprintln!(
                "   {} avg {:.0}ms per certificate (slowest stage: {})",
                dim("⏱"),
                report.stats.avg_total_ms,
                stage
            );
        }
    }
}

fn print_inventory(output_dir: &Path, folders: &[CompanyFolder]) {
    if folders.is_empty() {
        println!("No certificates filed under {}", output_dir.display());
        return;
    }

    let total: usize = folders.iter().map(|f| f.certificates.len()).sum();
    println!(
        "{} certificate(s) in {} folder(s) under {}",
        bold(&total.to_string()),
        folders.len(),
        output_dir.display()
    );
    for folder in folders {
        println!(
            "\n{}  {}",
            bold(&folder.name),
            dim(&format!(
                "({} file(s), {} KB)",
                folder.certificates.len(),
                folder.total_bytes().div_ceil(1024)
            ))
        );
        for cert in &folder.certificates {
            let modified = cert
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    {:<40}  {:>8} B  {}",
                cert.file_name,
                cert.size_bytes,
                dim(&modified)
            );
        }
    }
}
