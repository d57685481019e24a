//! Integration tests for the filing pipeline.
//!
//! Both external services are stubbed: `StubRasterizer` stands in for
//! pdfium/pdftoppm and `TableClassifier` answers from a per-file table, so
//! these tests need no network, no API key and no pdfium library.

use async_trait::async_trait;
use certfiler::{
    file_batch, file_certificate, file_inputs, BatchReport, CertFilerError, Classifier, FileError,
    FilingConfig, FilingProgressCallback, InputSource, Rasterizer, Upload,
};
use edgequake_llm::{ImageData, MockProvider};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Stubs ────────────────────────────────────────────────────────────────────

/// Accepts any byte string that ends in `%%EOF`; renders a small page with
/// one dark pixel.
struct StubRasterizer;

impl Rasterizer for StubRasterizer {
    fn rasterize(&self, pdf: &[u8], max_pages: usize) -> Result<Vec<DynamicImage>, FileError> {
        if !pdf.trim_ascii_end().ends_with(b"%%EOF") {
            return Err(FileError::decode("corrupt PDF: missing trailer"));
        }
        let mut img = RgbImage::from_pixel(32, 24, Rgb([255, 255, 255]));
        img.put_pixel(10, 10, Rgb([0, 0, 0]));
        Ok(vec![DynamicImage::ImageRgb8(img); max_pages.min(1)])
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Answers with the text registered for the upload's file name.
///
/// Unregistered names get an API-style failure.
#[derive(Default)]
struct TableClassifier {
    answers: HashMap<String, String>,
    calls: AtomicUsize,
}

impl TableClassifier {
    fn with(answers: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for TableClassifier {
    async fn classify(&self, image: ImageData, file_name: &str) -> Result<String, FileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!image.data.is_empty(), "classifier received an empty image");
        self.answers
            .get(file_name)
            .cloned()
            .ok_or_else(|| FileError::classification("API call failed: 401 Unauthorized"))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn pdf(body: &str) -> Vec<u8> {
    format!("%PDF-1.4\n{body}\n%%EOF\n").into_bytes()
}

fn config(root: &Path, classifier: Arc<TableClassifier>) -> FilingConfig {
    FilingConfig::builder()
        .output_dir(root)
        .rasterizer(Arc::new(StubRasterizer))
        .classifier(classifier)
        .build()
        .unwrap()
}

fn error_of<'a>(report: &'a BatchReport, name: &str) -> &'a FileError {
    report
        .files
        .iter()
        .find(|f| f.file_name == name)
        .and_then(|f| f.error())
        .unwrap_or_else(|| panic!("{name} did not fail: {report:#?}"))
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Filing ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn files_single_certificate_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("certificates");
    let bytes = pdf("award body");
    let classifier = TableClassifier::with(&[("award.pdf", "Acme")]);

    let report = file_batch(
        vec![Upload::new("award.pdf", bytes.clone())],
        &config(&root, classifier.clone()),
    )
    .await
    .unwrap();

    let expected = root.join("Acme").join("award.pdf");
    assert_eq!(report.stats.filed, 1);
    assert_eq!(report.files[0].company(), Some("Acme"));
    assert_eq!(report.files[0].stored_path(), Some(&expected));
    assert_eq!(std::fs::read(&expected).unwrap(), bytes);
    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn same_company_shares_folder_and_suffixes_collisions() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let classifier = TableClassifier::with(&[("award.pdf", "Acme"), ("course.pdf", "The Acme Corp.")]);

    let first = pdf("first");
    let second = pdf("second");
    let report = file_batch(
        vec![
            Upload::new("award.pdf", first.clone()),
            Upload::new("award.pdf", second.clone()),
            Upload::new("course.pdf", pdf("third")),
        ],
        &config(&root, classifier),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.filed, 3);
    assert_eq!(dir_entries(&root), vec!["Acme"]);
    assert_eq!(
        dir_entries(&root.join("Acme")),
        vec!["award.pdf", "award_1.pdf", "course.pdf"]
    );
    assert_eq!(std::fs::read(root.join("Acme/award.pdf")).unwrap(), first);
    assert_eq!(std::fs::read(root.join("Acme/award_1.pdf")).unwrap(), second);
    assert_eq!(report.by_company()["Acme"].len(), 3);
}

#[tokio::test]
async fn corrupt_pdf_fails_alone() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let classifier = TableClassifier::with(&[
        ("good.pdf", "Acme"),
        ("broken.pdf", "Acme"),
        ("also-good.pdf", "Initech"),
    ]);

    let report = file_batch(
        vec![
            Upload::new("good.pdf", pdf("ok")),
            Upload::new("broken.pdf", b"%PDF-1.4\ntruncated".to_vec()),
            Upload::new("also-good.pdf", pdf("ok")),
        ],
        &config(&root, classifier.clone()),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.filed, 2);
    assert_eq!(report.stats.failed, 1);
    assert!(matches!(error_of(&report, "broken.pdf"), FileError::Decode { .. }));
    assert!(root.join("Acme/good.pdf").exists());
    assert!(root.join("Initech/also-good.pdf").exists());
    assert_eq!(dir_entries(&root.join("Acme")), vec!["good.pdf"]);
    // The broken file never reached the model.
    assert_eq!(classifier.calls(), 2);
}

#[tokio::test]
async fn non_pdf_upload_is_decode_error_before_rendering() {
    let tmp = TempDir::new().unwrap();
    let classifier = TableClassifier::with(&[("photo.pdf", "Acme")]);

    let report = file_batch(
        vec![
            Upload::new("photo.pdf", b"\x89PNG\r\n\x1a\n".to_vec()),
            Upload::new("empty.pdf", Vec::<u8>::new()),
        ],
        &config(tmp.path(), classifier.clone()),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.failed, 2);
    assert_eq!(error_of(&report, "photo.pdf").kind(), "DecodeError");
    assert_eq!(error_of(&report, "empty.pdf").kind(), "DecodeError");
    assert_eq!(classifier.calls(), 0);
    assert!(dir_entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn oversize_upload_is_decode_error() {
    let tmp = TempDir::new().unwrap();
    let classifier = TableClassifier::with(&[("big.pdf", "Acme")]);
    let cfg = FilingConfig::builder()
        .output_dir(tmp.path())
        .rasterizer(Arc::new(StubRasterizer))
        .classifier(classifier)
        .max_file_size_mb(1)
        .build()
        .unwrap();

    let mut big = pdf("");
    big.resize(1024 * 1024 + 1, b' ');
    let report = file_batch(vec![Upload::new("big.pdf", big)], &cfg).await.unwrap();

    let err = error_of(&report, "big.pdf");
    assert!(matches!(err, FileError::Decode { .. }));
    assert!(err.to_string().contains("exceeds"), "got: {err}");
}

#[tokio::test]
async fn empty_or_unknown_answer_is_classification_error() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let classifier = TableClassifier::with(&[
        ("blank.pdf", ""),
        ("quotes.pdf", "\"\""),
        ("unknown.pdf", "Unknown_Company"),
        ("symbols.pdf", "???"),
        ("fine.pdf", "Globex"),
    ]);

    let uploads = ["blank.pdf", "quotes.pdf", "unknown.pdf", "symbols.pdf", "fine.pdf"]
        .iter()
        .map(|n| Upload::new(*n, pdf(n)))
        .collect();
    let report = file_batch(uploads, &config(&root, classifier)).await.unwrap();

    for name in ["blank.pdf", "quotes.pdf", "unknown.pdf", "symbols.pdf"] {
        assert!(
            matches!(error_of(&report, name), FileError::Classification { .. }),
            "{name}"
        );
    }
    // No blank-named or sentinel folder was created.
    assert_eq!(dir_entries(&root), vec!["Globex"]);
}

#[tokio::test]
async fn mock_provider_answers_flow_through_the_pipeline() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let mock = MockProvider::new();
    mock.add_response("The Acme Corp.").await;
    mock.add_response("").await;

    let config = FilingConfig::builder()
        .output_dir(&root)
        .rasterizer(Arc::new(StubRasterizer))
        .provider(Arc::new(mock))
        .build()
        .unwrap();
    let report = file_batch(
        vec![Upload::new("a.pdf", pdf("a")), Upload::new("b.pdf", pdf("b"))],
        &config,
    )
    .await
    .unwrap();

    assert_eq!(report.stats.filed, 1, "{report:#?}");
    assert!(root.join("Acme/a.pdf").exists());
    assert!(matches!(
        error_of(&report, "b.pdf"),
        FileError::Classification { .. }
    ));
    assert_eq!(dir_entries(&root), vec!["Acme"]);
}

#[tokio::test]
async fn classifier_failure_is_classification_error() {
    let tmp = TempDir::new().unwrap();
    let classifier = TableClassifier::with(&[]);

    let report = file_batch(
        vec![Upload::new("award.pdf", pdf("x"))],
        &config(tmp.path(), classifier),
    )
    .await
    .unwrap();

    let err = error_of(&report, "award.pdf");
    assert_eq!(err.kind(), "ClassificationError");
    assert!(err.to_string().contains("401"), "got: {err}");
    assert!(report.files[0].timings.store_ms == 0);
}

// ── Never overwrite ──────────────────────────────────────────────────────────

#[tokio::test]
async fn rerunning_same_upload_never_overwrites() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let classifier = TableClassifier::with(&[("award.pdf", "Acme")]);
    let cfg = config(&root, classifier);

    let original = pdf("v1");
    file_batch(vec![Upload::new("award.pdf", original.clone())], &cfg)
        .await
        .unwrap();
    let second = file_batch(vec![Upload::new("award.pdf", pdf("v2"))], &cfg)
        .await
        .unwrap();

    assert_eq!(std::fs::read(root.join("Acme/award.pdf")).unwrap(), original);
    assert_eq!(
        second.files[0].stored_path(),
        Some(&root.join("Acme").join("award_1.pdf"))
    );
}

#[tokio::test]
async fn unrelated_files_are_left_untouched() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    std::fs::create_dir_all(root.join("Acme")).unwrap();
    std::fs::write(root.join("Acme/award.pdf"), b"hand-filed").unwrap();
    std::fs::write(root.join("Acme/notes.txt"), b"notes").unwrap();
    std::fs::write(root.join("README"), b"readme").unwrap();

    let classifier = TableClassifier::with(&[("award.pdf", "Acme")]);
    let report = file_batch(
        vec![Upload::new("award.pdf", pdf("new"))],
        &config(&root, classifier),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.filed, 1);
    assert_eq!(std::fs::read(root.join("Acme/award.pdf")).unwrap(), b"hand-filed");
    assert_eq!(std::fs::read(root.join("Acme/notes.txt")).unwrap(), b"notes");
    assert_eq!(std::fs::read(root.join("README")).unwrap(), b"readme");
    assert!(root.join("Acme/award_1.pdf").exists());
}

#[tokio::test]
async fn stored_name_uses_final_component_and_pdf_extension() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let classifier = TableClassifier::with(&[("award", "Acme"), ("cert 2024.pdf", "Acme")]);

    let report = file_batch(
        vec![
            Upload::new("../../uploads/award", pdf("a")),
            Upload::new("C:\\Users\\me\\cert 2024.pdf", pdf("b")),
        ],
        &config(&root, classifier),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.filed, 2, "{report:#?}");
    assert_eq!(
        dir_entries(&root.join("Acme")),
        vec!["award.pdf", "cert 2024.pdf"]
    );
}

#[tokio::test]
async fn stored_name_keeps_long_names_with_spaces() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let name = "Certificate of Completion - Advanced Kubernetes Administration 2024.pdf";
    let classifier = TableClassifier::with(&[(name, "Acme")]);

    let report = file_batch(
        vec![
            Upload::new(name, pdf("a")),
            Upload::new(name, pdf("b")),
        ],
        &config(&root, classifier),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.filed, 2, "{report:#?}");
    assert_eq!(
        dir_entries(&root.join("Acme")),
        vec![
            "Certificate of Completion - Advanced Kubernetes Administration 2024.pdf",
            "Certificate of Completion - Advanced Kubernetes Administration 2024_1.pdf",
        ]
    );
}

// ── Entry points and fatal errors ────────────────────────────────────────────

#[tokio::test]
async fn file_inputs_reports_missing_paths_per_file() {
    let tmp = TempDir::new().unwrap();
    let inbox = tmp.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    let present = inbox.join("award.pdf");
    std::fs::write(&present, pdf("on disk")).unwrap();
    let missing: PathBuf = inbox.join("missing.pdf");

    let root = tmp.path().join("out");
    let classifier = TableClassifier::with(&[("award.pdf", "Acme")]);
    let inputs = vec![
        InputSource::parse(missing.to_str().unwrap()),
        InputSource::parse(present.to_str().unwrap()),
    ];

    let report = file_inputs(&inputs, &config(&root, classifier)).await.unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[0].file_name, "missing.pdf");
    assert_eq!(error_of(&report, "missing.pdf").kind(), "FilesystemError");
    assert!(report.files[1].is_filed());
    assert!(root.join("Acme/award.pdf").exists());
}

#[tokio::test]
async fn file_certificate_handles_one_upload() {
    let tmp = TempDir::new().unwrap();
    let classifier = TableClassifier::with(&[("award.pdf", "Company: Initech, Inc.")]);

    let report = file_certificate(
        &Upload::new("award.pdf", pdf("single")),
        &config(tmp.path(), classifier),
    )
    .await
    .unwrap();

    assert_eq!(report.company(), Some("Initech"));
    assert!(tmp.path().join("Initech/award.pdf").exists());
}

#[tokio::test]
async fn output_root_that_is_a_file_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("certificates");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let classifier = TableClassifier::with(&[("award.pdf", "Acme")]);

    let err = file_batch(
        vec![Upload::new("award.pdf", pdf("x"))],
        &config(&blocker, classifier.clone()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CertFilerError::OutputDirUnusable { .. }));
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn empty_batch_is_an_empty_report() {
    let tmp = TempDir::new().unwrap();
    let report = file_batch(Vec::new(), &config(tmp.path(), TableClassifier::with(&[])))
        .await
        .unwrap();
    assert!(report.files.is_empty());
    assert_eq!(report.stats.total_files, 0);
}

// ── Progress and reporting ───────────────────────────────────────────────────

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl FilingProgressCallback for RecordingCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.events.lock().unwrap().push(format!("start {total_files}"));
    }

    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("file {index}/{total} {file_name}"));
    }

    fn on_file_filed(&self, _index: usize, _total: usize, file_name: &str, company: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("filed {file_name} {company}"));
    }

    fn on_file_error(&self, _index: usize, _total: usize, file_name: &str, _error: &str) {
        self.events.lock().unwrap().push(format!("error {file_name}"));
    }

    fn on_batch_complete(&self, total_files: usize, filed: usize, _output_dir: &Path) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {filed}/{total_files}"));
    }
}

#[tokio::test]
async fn progress_events_follow_upload_order() {
    let tmp = TempDir::new().unwrap();
    let recorder = Arc::new(RecordingCallback::default());
    let cfg = FilingConfig::builder()
        .output_dir(tmp.path())
        .rasterizer(Arc::new(StubRasterizer))
        .classifier(TableClassifier::with(&[("a.pdf", "Acme")]))
        .progress_callback(recorder.clone() as Arc<dyn FilingProgressCallback>)
        .build()
        .unwrap();

    file_batch(
        vec![
            Upload::new("a.pdf", pdf("a")),
            Upload::new("b.pdf", b"nope".to_vec()),
        ],
        &cfg,
    )
    .await
    .unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 2",
            "file 1/2 a.pdf",
            "filed a.pdf Acme",
            "file 2/2 b.pdf",
            "error b.pdf",
            "done 1/2",
        ]
    );
}

#[tokio::test]
async fn report_serialises_with_error_kinds() {
    let tmp = TempDir::new().unwrap();
    let classifier = TableClassifier::with(&[("a.pdf", "Acme")]);

    let report = file_batch(
        vec![
            Upload::new("a.pdf", pdf("a")),
            Upload::new("b.pdf", b"nope".to_vec()),
        ],
        &config(tmp.path(), classifier),
    )
    .await
    .unwrap();

    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["files"][0]["outcome"]["status"], "filed");
    assert_eq!(json["files"][0]["outcome"]["company"], "Acme");
    assert_eq!(json["files"][1]["outcome"]["status"], "failed");
    assert_eq!(json["files"][1]["outcome"]["error"]["kind"], "decode");
    assert_eq!(json["stats"]["filed"], 1);
}

#[tokio::test]
async fn inventory_lists_what_was_filed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let classifier = TableClassifier::with(&[("a.pdf", "Acme"), ("b.pdf", "Globex")]);

    file_batch(
        vec![Upload::new("a.pdf", pdf("a")), Upload::new("b.pdf", pdf("b"))],
        &config(&root, classifier),
    )
    .await
    .unwrap();

    let folders = certfiler::scan(&root).await.unwrap();
    let summary: Vec<(String, Vec<String>)> = folders
        .into_iter()
        .map(|f| {
            (
                f.name,
                f.certificates.into_iter().map(|c| c.file_name).collect(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Acme".to_string(), vec!["a.pdf".to_string()]),
            ("Globex".to_string(), vec!["b.pdf".to_string()]),
        ]
    );
}
