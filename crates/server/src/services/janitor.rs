//! Storage janitor: retention sweep of stored invoice PDFs.
//!
//! Invoked opportunistically at the start of upload operations, not on a
//! timer. Retention is keyed to the invoice record's creation time, not
//! filesystem metadata, so a just-created artifact is never deleted on
//! the strength of an ambiguous file timestamp. Files no record points
//! at (orphans) fall back to their modification time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::db::{InvoiceRepository, RepositoryError};

/// Whether a record's artifact has aged out of the retention window.
///
/// Strictly older than the cutoff: an artifact created exactly at
/// `now - retention` survives this sweep.
#[must_use]
pub fn record_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, retention: Duration) -> bool {
    created_at < now - retention
}

/// Delete expired PDF artifacts, returning how many files were removed.
///
/// Two passes: artifacts referenced by expired records (record creation
/// time decides), then orphan PDFs nothing references (file mtime
/// decides). Records whose artifact is removed keep their series/number
/// but lose the pdf reference.
///
/// # Errors
///
/// Returns `RepositoryError` if the record queries fail; individual file
/// deletion failures are logged and skipped.
pub async fn sweep(
    invoices: &InvoiceRepository<'_>,
    dir: &Path,
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<usize, RepositoryError> {
    let cutoff = now - retention;
    let mut deleted = 0;

    for record in invoices.artifacts_older_than(cutoff).await? {
        let Some(filename) = record.pdf_path.as_deref() else {
            continue;
        };
        let path = dir.join(filename);

        match std::fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not delete artifact");
                continue;
            }
        }

        // The record survives; only the artifact reference is dropped.
        invoices.clear_pdf_path(record.id).await?;
    }

    let referenced: HashSet<String> = invoices.all_pdf_paths().await?.into_iter().collect();
    for path in orphan_files(dir, &referenced, cutoff) {
        match std::fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not delete orphan artifact");
            }
        }
    }

    if deleted > 0 {
        tracing::info!(deleted, "storage sweep removed expired invoice artifacts");
    }

    Ok(deleted)
}

/// PDFs in `dir` that no record references and whose mtime is older than
/// the cutoff.
fn orphan_files(dir: &Path, referenced: &HashSet<String>, cutoff: DateTime<Utc>) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                return false;
            };
            if !name.ends_with(".pdf") || referenced.contains(name) {
                return false;
            }

            let Ok(metadata) = entry.metadata() else {
                return false;
            };
            if !metadata.is_file() {
                return false;
            }
            match metadata.modified() {
                Ok(mtime) => DateTime::<Utc>::from(mtime) < cutoff,
                Err(_) => false,
            }
        })
        .map(|entry| entry.path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_boundary() {
        let now = Utc::now();
        let retention = Duration::days(30);

        // 31 days old: expired. 29 days old: kept. Exactly 30: kept.
        assert!(record_expired(now - Duration::days(31), now, retention));
        assert!(!record_expired(now - Duration::days(29), now, retention));
        assert!(!record_expired(now - Duration::days(30), now, retention));
    }

    #[test]
    fn test_orphan_selection_skips_referenced_and_recent_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let referenced_name = "invoice_1_FCT_0001.pdf";
        let orphan_name = "invoice_2_FCT_0002.pdf";
        std::fs::write(dir.path().join(referenced_name), b"pdf").expect("write");
        std::fs::write(dir.path().join(orphan_name), b"pdf").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"txt").expect("write");

        let referenced = HashSet::from([referenced_name.to_owned()]);

        // Cutoff in the past: both files were just written, nothing is old
        // enough to delete.
        let past_cutoff = Utc::now() - Duration::days(30);
        assert!(orphan_files(dir.path(), &referenced, past_cutoff).is_empty());

        // Cutoff in the future makes the files "old": only the
        // unreferenced PDF qualifies.
        let future_cutoff = Utc::now() + Duration::days(1);
        let orphans = orphan_files(dir.path(), &referenced, future_cutoff);
        assert_eq!(orphans.len(), 1);
        assert_eq!(
            orphans[0].file_name().and_then(|n| n.to_str()),
            Some(orphan_name)
        );
    }

    #[test]
    fn test_orphan_selection_missing_dir_is_empty() {
        let missing = Path::new("/definitely/not/a/real/storage/dir");
        assert!(orphan_files(missing, &HashSet::new(), Utc::now()).is_empty());
    }
}
