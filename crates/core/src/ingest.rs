use crate::extractor::extract_document_with_fallback;
use crate::models::PdfDocument;
use crate::traits::PdfTranscriber;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Every `*.pdf` below `folder`, in file-name order within each directory.
/// Unreadable entries are skipped.
pub fn find_pdfs(folder: &Path) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect()
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Default)]
pub struct DirectoryReport {
    pub documents: Vec<PdfDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Extracts every PDF under `folder`, skipping the ones that cannot be read.
pub async fn process_directory(
    folder: &Path,
    transcriber: Option<&dyn PdfTranscriber>,
) -> DirectoryReport {
    if !folder.exists() {
        warn!(folder = %folder.display(), "directory not found");
        return DirectoryReport::default();
    }

    let files = find_pdfs(folder);
    if files.is_empty() {
        warn!(folder = %folder.display(), "no pdf files found");
        return DirectoryReport::default();
    }

    info!(folder = %folder.display(), pdf_count = files.len(), "processing pdfs");

    let mut report = DirectoryReport::default();
    for path in files {
        match extract_document_with_fallback(&path, transcriber).await {
            Ok(document) => report.documents.push(document),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipped pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    report
}
