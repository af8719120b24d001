use crate::error::IngestError;
use crate::models::{PageText, PdfDocument};
use crate::traits::PdfTranscriber;
use chrono::Utc;
use lopdf::Document;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

/// Page text from raw PDF bytes; `source` only labels log lines and errors.
pub trait PdfExtractor {
    fn extract_pages(&self, pdf: &[u8], source: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, pdf: &[u8], source: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(pdf).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(path = %source.display(), page = page_no, %error, "page text unreadable");
                    String::new()
                }
            };
            pages.push(PageText::new(page_no, text));
        }

        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                source.display()
            )));
        }

        Ok(pages)
    }
}

pub fn extract_document(path: &Path) -> Result<PdfDocument, IngestError> {
    let pdf = std::fs::read(path)?;
    let pages = LopdfExtractor.extract_pages(&pdf, path)?;
    build_document(path, &pdf, pages)
}

/// Falls back to the transcriber when the PDF has no text layer.
pub async fn extract_document_with_fallback(
    path: &Path,
    transcriber: Option<&dyn PdfTranscriber>,
) -> Result<PdfDocument, IngestError> {
    let pdf = tokio::fs::read(path).await?;
    match LopdfExtractor.extract_pages(&pdf, path) {
        Ok(pages) => build_document(path, &pdf, pages),
        Err(IngestError::PdfParse(parse_error)) => {
            let Some(transcriber) = transcriber else {
                return Err(IngestError::PdfParse(parse_error));
            };

            warn!(path = %path.display(), "no text layer, sending pdf to multimodal OCR");
            let text = transcriber.transcribe_pdf(&pdf).await.map_err(|ocr_error| {
                IngestError::PdfParse(format!(
                    "{parse_error}; multimodal OCR fallback failed: {ocr_error}"
                ))
            })?;

            let pages = split_transcript(&text, path)?;
            build_document(path, &pdf, pages)
        }
        Err(error) => Err(error),
    }
}

/// The checksum is the sha256 of the bytes the pages were read from.
fn build_document(path: &Path, pdf: &[u8], pages: Vec<PageText>) -> Result<PdfDocument, IngestError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    Ok(PdfDocument {
        file_path: path.to_string_lossy().to_string(),
        file_name: file_name.to_string(),
        checksum: format!("{:x}", Sha256::digest(pdf)),
        total_pages: pages.len() as u32,
        pages,
        extracted_at: Utc::now(),
    })
}

/// Pages in a transcript are separated by form feeds.
fn split_transcript(text: &str, path: &Path) -> Result<Vec<PageText>, IngestError> {
    let pages = text
        .split('\u{000c}')
        .enumerate()
        .filter_map(|(index, page)| {
            let trimmed = page.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PageText::new((index + 1) as u32, trimmed))
            }
        })
        .collect::<Vec<_>>();

    if pages.is_empty() {
        return Err(IngestError::OcrFailed(format!(
            "multimodal OCR response has no readable text: {}",
            path.display()
        )));
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FixedTranscriber(String);

    #[async_trait]
    impl PdfTranscriber for FixedTranscriber {
        async fn transcribe_pdf(&self, _pdf: &[u8]) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn transcript_split_by_form_feed_keeps_page_positions() {
        let pages = split_transcript("First page\u{000C}  \u{000C}Third page\n", Path::new("x.pdf"))
            .expect("transcript should split");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "First page");
        assert_eq!(pages[1].number, 3);
        assert_eq!(pages[1].word_count, 2);
    }

    #[test]
    fn blank_transcript_is_an_ocr_failure() {
        let result = split_transcript(" \u{000C} ", Path::new("x.pdf"));
        assert!(matches!(result, Err(IngestError::OcrFailed(_))));
    }

    #[test]
    fn broken_pdf_without_transcriber_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(extract_document(&path), Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn broken_pdf_falls_back_to_transcriber() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("scanned_2023.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%scanned")?;

        let transcriber = FixedTranscriber("Q.1 What is paging?\u{000C}Q.2 Define a semaphore.".to_string());
        let document = extract_document_with_fallback(&path, Some(&transcriber)).await?;

        assert_eq!(document.file_name, "scanned_2023.pdf");
        assert_eq!(document.total_pages, 2);
        assert!(document.full_text().contains("semaphore"));
        Ok(())
    }

    #[tokio::test]
    async fn checksum_follows_file_content() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let transcriber = FixedTranscriber("Q.1 What is paging?".to_string());
        let mut checksums = Vec::new();
        for (name, bytes) in [
            ("a.pdf", b"%PDF-1.4\n%one".as_slice()),
            ("copy.pdf", b"%PDF-1.4\n%one".as_slice()),
            ("b.pdf", b"%PDF-1.4\n%two".as_slice()),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, bytes)?;
            checksums.push(extract_document_with_fallback(&path, Some(&transcriber)).await?.checksum);
        }

        assert_eq!(checksums[0].len(), 64);
        assert_eq!(checksums[0], checksums[1]);
        assert_ne!(checksums[0], checksums[2]);
        Ok(())
    }
}
