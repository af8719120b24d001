use crate::error::IngestError;
use crate::models::{ChunkMetadata, IngestionOptions, PdfDocument, Question, SourceType, TextChunk};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits text into overlapping chunks of at most `chunk_size` characters,
/// preferring paragraph, line, sentence and word boundaries in that order.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    config: ChunkingConfig,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        if config.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text).into_iter().map(|span| span.text).collect()
    }

    /// Trimmed pieces together with the byte offset where each starts in `text`.
    fn split_spans(&self, text: &str) -> Vec<Span> {
        split_recursive(text, 0, &SEPARATORS, self.config)
            .into_iter()
            .filter_map(Span::trimmed)
            .collect()
    }

    pub fn chunk_text(&self, text: &str, metadata: ChunkMetadata) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(index, piece)| make_chunk(index as u64, piece, 1, metadata.clone()))
            .collect()
    }

    /// Chunks a whole extracted PDF; every chunk remembers the page it starts on.
    pub fn chunk_document(
        &self,
        document: &PdfDocument,
        subject: Option<&str>,
        topic: Option<&str>,
    ) -> Vec<TextChunk> {
        let mut joined = String::new();
        let mut page_offsets = Vec::new();
        for page in document.pages.iter().filter(|page| !page.text.trim().is_empty()) {
            if !joined.is_empty() {
                joined.push_str("\n\n");
            }
            page_offsets.push((joined.len(), page.number));
            joined.push_str(&page.text);
        }

        let metadata = ChunkMetadata {
            subject: subject.map(str::to_string),
            topic: topic.map(str::to_string),
            source_file: Some(document.file_name.clone()),
            source_type: SourceType::Textbook,
            total_pages: Some(document.total_pages),
            ..ChunkMetadata::default()
        };

        let first_page = page_offsets.first().map_or(1, |(_, page)| *page);
        self.split_spans(&joined)
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let page = page_offsets
                    .iter()
                    .take_while(|(offset, _)| *offset <= span.start)
                    .last()
                    .map_or(first_page, |(_, page)| *page);
                make_chunk(index as u64, span.text, page, metadata.clone())
            })
            .collect()
    }

    pub fn chunk_by_subject_topic(
        &self,
        text: &str,
        subject: &str,
        topic: &str,
        source_file: Option<&str>,
    ) -> Vec<TextChunk> {
        let metadata = ChunkMetadata {
            subject: Some(subject.to_string()),
            topic: Some(topic.to_string()),
            source_file: source_file.map(str::to_string),
            source_type: SourceType::Textbook,
            ..ChunkMetadata::default()
        };
        self.chunk_text(text, metadata)
    }
}

/// One chunk per question: the stem followed by its options.
pub fn chunk_questions(questions: &[Question]) -> Vec<TextChunk> {
    questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let metadata = ChunkMetadata {
                subject: question.subject.clone(),
                topic: question.topic.clone(),
                source_file: None,
                source_type: SourceType::Question,
                total_pages: None,
                year: Some(question.year),
                paper_set: Some(question.paper_set.clone()),
                difficulty: Some(question.difficulty),
            };
            make_chunk(index as u64, question.full_text(), 1, metadata)
        })
        .collect()
}

fn make_chunk(index: u64, text: String, page_number: u32, metadata: ChunkMetadata) -> TextChunk {
    let source = metadata.source_file.as_deref().unwrap_or_default();
    TextChunk {
        chunk_id: make_chunk_id(source, index, &text),
        chunk_index: index,
        char_count: text.chars().count(),
        word_count: text.split_whitespace().count(),
        text,
        page_number,
        metadata,
        embedding: None,
    }
}

fn make_chunk_id(source: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// A piece of split text and the byte offset of its first character in the
/// text handed to the chunker.
#[derive(Debug, Clone, PartialEq)]
struct Span {
    start: usize,
    text: String,
}

impl Span {
    fn trimmed(self) -> Option<Span> {
        let leading = self.text.len() - self.text.trim_start().len();
        let text = self.text.trim();
        (!text.is_empty()).then(|| Span {
            start: self.start + leading,
            text: text.to_string(),
        })
    }
}

/// Non-empty pieces of `text` between separators, with their byte offsets.
fn split_with_offsets<'t>(text: &'t str, separator: &str) -> Vec<(usize, &'t str)> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(at, c)| (at, &text[at..at + c.len_utf8()]))
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (at, _) in text.match_indices(separator) {
        if at > start {
            pieces.push((start, &text[start..at]));
        }
        start = at + separator.len();
    }
    if start < text.len() {
        pieces.push((start, &text[start..]));
    }
    pieces
}

fn split_recursive(
    text: &str,
    base: usize,
    separators: &[&str],
    config: ChunkingConfig,
) -> Vec<Span> {
    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or_default();
    let remaining = separators.get(position + 1..).unwrap_or_default();

    let mut chunks = Vec::new();
    let mut fitting = Vec::new();
    for (offset, piece) in split_with_offsets(text, separator) {
        let start = base + offset;
        if char_len(piece) < config.chunk_size {
            fitting.push((start, piece));
            continue;
        }

        if !fitting.is_empty() {
            chunks.extend(merge_splits(&fitting, separator, config));
            fitting.clear();
        }
        if remaining.is_empty() {
            chunks.push(Span {
                start,
                text: piece.to_string(),
            });
        } else {
            chunks.extend(split_recursive(piece, start, remaining, config));
        }
    }

    if !fitting.is_empty() {
        chunks.extend(merge_splits(&fitting, separator, config));
    }

    chunks
}

type Window<'t> = VecDeque<(usize, &'t str)>;

/// Greedily packs pieces up to `chunk_size`, carrying at most `chunk_overlap`
/// characters of trailing pieces into the next chunk.
fn merge_splits(pieces: &[(usize, &str)], separator: &str, config: ChunkingConfig) -> Vec<Span> {
    let separator_len = char_len(separator);
    let joiner = |window: &Window<'_>| if window.is_empty() { 0 } else { separator_len };
    let mut merged = Vec::new();
    let mut window: Window = VecDeque::new();
    let mut total = 0usize;

    for &(start, piece) in pieces {
        let piece_len = char_len(piece);

        if !window.is_empty() && total + piece_len + joiner(&window) > config.chunk_size {
            push_joined(&mut merged, &window, separator);

            while total > 0 {
                let overflows = total + piece_len + joiner(&window) > config.chunk_size;
                if total <= config.chunk_overlap && !overflows {
                    break;
                }
                let Some((_, front)) = window.pop_front() else {
                    break;
                };
                total -= char_len(front) + joiner(&window);
            }
        }

        total += piece_len + joiner(&window);
        window.push_back((start, piece));
    }

    push_joined(&mut merged, &window, separator);
    merged
}

fn push_joined(merged: &mut Vec<Span>, window: &Window<'_>, separator: &str) {
    let Some(&(start, _)) = window.front() else {
        return;
    };
    let text = window
        .iter()
        .map(|(_, piece)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    if let Some(span) = (Span { start, text }).trimmed() {
        merged.push(span);
    }
}
