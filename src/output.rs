//! Result types for a filing batch.
//!
//! Every uploaded file gets exactly one [`FileReport`], in upload order,
//! whether it was filed or not. Everything here is `Serialize` so the CLI's
//! `--json` mode can print a [`BatchReport`] directly.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What happened to one uploaded certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Written under `<output_dir>/<company>/`.
    Filed { company: String, path: PathBuf },
    /// Not written; the batch carried on.
    Failed { error: FileError },
}

/// Wall-clock time spent in each stage, in milliseconds.
///
/// Stages that never ran (because an earlier one failed) stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    /// Validation, rasterising and image encoding.
    pub render_ms: u64,
    /// Classifier call and answer parsing.
    pub classify_ms: u64,
    /// Folder creation and file write.
    pub store_ms: u64,
    pub total_ms: u64,
}

/// Report for one uploaded certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// Upload name as given by the user.
    pub file_name: String,
    pub outcome: FileOutcome,
    pub timings: StageTimings,
}

impl FileReport {
    pub fn is_filed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Filed { .. })
    }

    pub fn company(&self) -> Option<&str> {
        match &self.outcome {
            FileOutcome::Filed { company, .. } => Some(company),
            FileOutcome::Failed { .. } => None,
        }
    }

    pub fn stored_path(&self) -> Option<&PathBuf> {
        match &self.outcome {
            FileOutcome::Filed { path, .. } => Some(path),
            FileOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&FileError> {
        match &self.outcome {
            FileOutcome::Filed { .. } => None,
            FileOutcome::Failed { error } => Some(error),
        }
    }
}

/// Aggregate numbers for a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub filed: usize,
    pub failed: usize,
    /// Wall-clock time for the whole batch.
    pub total_duration_ms: u64,
    /// Per-stage averages over filed certificates only.
    pub avg_render_ms: f64,
    pub avg_classify_ms: f64,
    pub avg_store_ms: f64,
    pub avg_total_ms: f64,
}

impl BatchStats {
    /// Fraction of files filed, 0.0–1.0. An empty batch counts as 0.
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.filed as f64 / self.total_files as f64
        }
    }

    /// Name of the slowest stage on average, if anything was filed.
    pub fn slowest_stage(&self) -> Option<&'static str> {
        if self.filed == 0 {
            return None;
        }
        [
            ("render", self.avg_render_ms),
            ("classify", self.avg_classify_ms),
            ("store", self.avg_store_ms),
        ]
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name)
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per upload, in upload order.
    pub files: Vec<FileReport>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// Build a report and its statistics from per-file reports.
    pub fn from_files(files: Vec<FileReport>, total_duration_ms: u64) -> Self {
        let filed: Vec<&FileReport> = files.iter().filter(|f| f.is_filed()).collect();
        let avg = |pick: fn(&StageTimings) -> u64| -> f64 {
            if filed.is_empty() {
                0.0
            } else {
                filed.iter().map(|f| pick(&f.timings) as f64).sum::<f64>() / filed.len() as f64
            }
        };

        let stats = BatchStats {
            total_files: files.len(),
            filed: filed.len(),
            failed: files.len() - filed.len(),
            total_duration_ms,
            avg_render_ms: avg(|t| t.render_ms),
            avg_classify_ms: avg(|t| t.classify_ms),
            avg_store_ms: avg(|t| t.store_ms),
            avg_total_ms: avg(|t| t.total_ms),
        };

        Self { files, stats }
    }

    /// Filed certificates grouped by company, companies sorted by name.
    pub fn by_company(&self) -> BTreeMap<&str, Vec<&FileReport>> {
        let mut groups: BTreeMap<&str, Vec<&FileReport>> = BTreeMap::new();
        for report in &self.files {
            if let Some(company) = report.company() {
                groups.entry(company).or_default().push(report);
            }
        }
        groups
    }

    /// Failed uploads, in upload order.
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| !f.is_filed())
    }
}
