use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, DefaultOnNull};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfDocument {
    pub file_path: String,
    pub file_name: String,
    pub checksum: String,
    pub total_pages: u32,
    pub pages: Vec<PageText>,
    pub extracted_at: DateTime<Utc>,
}

impl PdfDocument {
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
    pub word_count: usize,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            number,
            text,
            word_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Textbook,
    Question,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Textbook => "textbook",
            SourceType::Question => "question",
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChunkMetadata {
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub source_file: Option<String>,
    pub source_type: SourceType,
    pub total_pages: Option<u32>,
    pub year: Option<u16>,
    pub paper_set: Option<String>,
    pub difficulty: Option<u8>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub page_number: u32,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

/// A previous-year exam question.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub number: u32,
    pub text: String,
    pub options: Vec<String>,
    pub year: u16,
    pub paper_set: String,
    pub answer: String,
    pub difficulty: u8,
    pub marks: u8,
    pub subject: Option<String>,
    pub topic: Option<String>,
}

impl Question {
    /// Stem followed by one option per line, the form that gets embedded.
    pub fn full_text(&self) -> String {
        if self.options.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.text, self.options.join("\n"))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GraphStatistics {
    pub subjects: u64,
    pub topics: u64,
    pub questions: u64,
    pub chunks: u64,
    pub concepts: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: usize,
}

/// Graph properties come back as `null` when unset, hence `DefaultOnNull`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TopicInfo {
    pub topic: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub sample_chunks: Vec<String>,
    #[serde(default)]
    pub question_count: u64,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub concepts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkHit {
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    pub score: f64,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionRecord {
    pub question: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub marks: Option<u8>,
    #[serde(default)]
    pub paper_set: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSummary {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub question_count: u64,
}

/// Vector hits plus graph context for one topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HybridContext {
    pub topic_info: Option<TopicInfo>,
    pub relevant_chunks: Vec<ChunkHit>,
    pub search_query: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct UserStats {
    pub attempted: u64,
    pub correct: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicProgress {
    pub topic: String,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub total_questions: u64,
    #[serde(default)]
    pub attempts: u64,
    #[serde(default)]
    pub correct: u64,
    #[serde(default)]
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeakTopic {
    pub topic: String,
    pub subject: String,
    #[serde(default)]
    pub difficulty: Option<u8>,
    pub attempts: u64,
    pub correct: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
    pub id: String,
    pub subject: String,
    pub topic: String,
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub graph_batch_size: usize,
    pub default_subject: String,
    pub default_topic: String,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            graph_batch_size: 100,
            default_subject: "Operating Systems".to_string(),
            default_topic: "Process Management".to_string(),
        }
    }
}
