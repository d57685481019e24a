//! Read-only view of what has already been filed.
//!
//! [`scan`] walks one level of company folders under the output root and
//! lists the `.pdf` files inside each. Nothing here writes to disk.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One filed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredCertificate {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// `None` when the filesystem does not record modification times.
    pub modified: Option<DateTime<Local>>,
}

/// A company folder and the certificates in it, sorted by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyFolder {
    pub name: String,
    pub certificates: Vec<StoredCertificate>,
}

impl CompanyFolder {
    pub fn total_bytes(&self) -> u64 {
        self.certificates.iter().map(|c| c.size_bytes).sum()
    }
}

/// List company folders under `root`, sorted by name.
///
/// A missing root is an empty inventory. Loose files directly under the root
/// and non-PDF files inside company folders are ignored.
pub async fn scan(root: &Path) -> std::io::Result<Vec<CompanyFolder>> {
    let mut folders = Vec::new();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(folders),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let certificates = scan_folder(&entry.path()).await?;
        folders.push(CompanyFolder { name, certificates });
    }

    folders.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(folders)
}

async fn scan_folder(dir: &Path) -> std::io::Result<Vec<StoredCertificate>> {
    let mut certificates = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        certificates.push(StoredCertificate {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            path,
            size_bytes: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
        });
    }

    certificates.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(certificates)
}
