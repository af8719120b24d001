pub mod chunking;
pub mod deck;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod questions;
pub mod retriever;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod stores;
pub mod syllabus;
pub mod traits;
pub mod tutor;

#[cfg(test)]
mod testing;

pub use chunking::{normalize_whitespace, ChunkingConfig, TextChunker};
pub use deck::{DeckStats, FlashcardDeck, StoredCard};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{DeckError, GraphError, IngestError, LlmError};
pub use extractor::{extract_document, extract_document_with_fallback, LopdfExtractor, PdfExtractor};
pub use graph::GraphBuilder;
pub use ingest::{find_pdfs, process_directory, DirectoryReport, SkippedPdf};
pub use models::{
    ChunkHit, ChunkMetadata, Flashcard, GeneratedQuestion, GraphStatistics, HybridContext,
    IngestionOptions, LoadReport, PageText, PdfDocument, Question, QuestionRecord, SourceType,
    TextChunk, TopicInfo, TopicProgress, TopicSummary, UserStats, WeakTopic,
};
pub use pipeline::{resolve_syllabus, setup_database, DataLoader, TopicClassifier};
pub use progress::{ProgressTracker, DEFAULT_WEAK_THRESHOLD};
pub use retriever::{HybridRetriever, QuestionFilter};
pub use scheduler::{CardState, Rating, Scheduler, SchedulingState};
pub use session::{AnswerOutcome, LearnSession};
pub use stores::{GeminiClient, GenerationConfig, Neo4jClient};
pub use syllabus::Syllabus;
pub use traits::{CypherExecutor, LanguageModel, PdfTranscriber, Row};
pub use tutor::Tutor;
