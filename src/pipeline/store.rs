//! Filing: write the original certificate bytes under its company folder.
//!
//! ## Claiming names
//!
//! Checking `exists()` and then writing leaves a window in which another run
//! can claim the same name, and the later write silently overwrites it.
//! Opening with `create_new` makes "is this name free?" and "claim it" one
//! atomic filesystem call: a taken name fails with `AlreadyExists` and we move
//! on to the next suffix. Nothing the pipeline did not create is ever opened
//! for writing.

use crate::error::FileError;
use crate::pipeline::naming::sanitize_file_stem;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Stem used when the uploaded name has no usable characters.
const FALLBACK_STEM: &str = "certificate";

/// Upper bound on collision suffixes tried for one file name.
const MAX_SUFFIX: u32 = 10_000;

/// Store `bytes` as `<root>/<company>/<stem>[_N].pdf` and return the path.
///
/// `company` must already be sanitised (see
/// [`crate::pipeline::naming::sanitize_company_name`]).
pub async fn store_certificate(
    root: &Path,
    company: &str,
    original_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, FileError> {
    let dir = root.join(company);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| FileError::filesystem(&dir, &e))?;

    let stem = file_stem(original_name);

    for n in 0..=MAX_SUFFIX {
        let candidate = dir.join(candidate_name(&stem, n));
        let open = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;

        let mut file = match open {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{} exists, trying next suffix", candidate.display());
                continue;
            }
            Err(e) => return Err(FileError::filesystem(&candidate, &e)),
        };

        if let Err(e) = write_all_synced(&mut file, bytes).await {
            drop(file);
            // We created this file a moment ago; don't leave a truncated copy.
            if let Err(rm) = tokio::fs::remove_file(&candidate).await {
                warn!("Could not remove partial file {}: {}", candidate.display(), rm);
            }
            return Err(FileError::filesystem(&candidate, &e));
        }

        info!("Certificate saved: {}", candidate.display());
        return Ok(candidate);
    }

    Err(FileError::Filesystem {
        path: dir,
        detail: format!("no free file name for '{stem}' after {MAX_SUFFIX} attempts"),
    })
}

async fn write_all_synced(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// `cert.pdf` → `cert`; only characters unsafe in a file name are replaced.
fn file_stem(original_name: &str) -> String {
    Path::new(original_name)
        .file_stem()
        .and_then(|s| sanitize_file_stem(&s.to_string_lossy()))
        .unwrap_or_else(|| FALLBACK_STEM.to_string())
}

/// `n == 0` is the plain name; later candidates carry `_n`.
fn candidate_name(stem: &str, n: u32) -> String {
    if n == 0 {
        format!("{stem}.pdf")
    } else {
        format!("{stem}_{n}.pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn candidate_names() {
        assert_eq!(candidate_name("award", 0), "award.pdf");
        assert_eq!(candidate_name("award", 1), "award_1.pdf");
        assert_eq!(candidate_name("award", 12), "award_12.pdf");
    }

    #[test]
    fn stems() {
        assert_eq!(file_stem("award.pdf"), "award");
        assert_eq!(file_stem("Award.PDF"), "Award");
        assert_eq!(file_stem("my award.pdf"), "my award");
        assert_eq!(file_stem("a/b:c.pdf"), "b_c");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".pdf"), "pdf");
        assert_eq!(file_stem("..."), "certificate");
    }

    #[tokio::test]
    async fn stores_bytes_unchanged() {
        let tmp = TempDir::new().unwrap();
        let bytes = b"%PDF-1.4 certificate body".to_vec();
        let path = store_certificate(tmp.path(), "Acme", "award.pdf", &bytes)
            .await
            .unwrap();
        assert_eq!(path, tmp.path().join("Acme").join("award.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn collisions_get_incrementing_suffix() {
        let tmp = TempDir::new().unwrap();
        let first = store_certificate(tmp.path(), "Acme", "award.pdf", b"one")
            .await
            .unwrap();
        let second = store_certificate(tmp.path(), "Acme", "award.pdf", b"two")
            .await
            .unwrap();
        let third = store_certificate(tmp.path(), "Acme", "award.pdf", b"three")
            .await
            .unwrap();

        assert_eq!(first.file_name().unwrap(), "award.pdf");
        assert_eq!(second.file_name().unwrap(), "award_1.pdf");
        assert_eq!(third.file_name().unwrap(), "award_2.pdf");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        assert_eq!(std::fs::read(&third).unwrap(), b"three");
    }

    #[tokio::test]
    async fn existing_foreign_file_is_left_alone() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Acme");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("award.pdf"), b"someone else's").unwrap();

        let stored = store_certificate(tmp.path(), "Acme", "award.pdf", b"mine")
            .await
            .unwrap();

        assert_eq!(stored.file_name().unwrap(), "award_1.pdf");
        assert_eq!(std::fs::read(dir.join("award.pdf")).unwrap(), b"someone else's");
    }

    #[tokio::test]
    async fn longest_stem_still_fits_with_suffix() {
        let tmp = TempDir::new().unwrap();
        let name = format!("{}.pdf", "x".repeat(400));
        store_certificate(tmp.path(), "Acme", &name, b"one").await.unwrap();
        let second = store_certificate(tmp.path(), "Acme", &name, b"two")
            .await
            .unwrap();
        let stored = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(stored.len() <= 255);
        assert!(stored.ends_with("_1.pdf"));
    }

    #[tokio::test]
    async fn unwritable_root_is_filesystem_error() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the company folder's parent should be.
        let blocker = tmp.path().join("root");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let err = store_certificate(&blocker, "Acme", "award.pdf", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Filesystem { .. }));
    }
}
