use crate::chunking::{ChunkingConfig, TextChunker};
use crate::embeddings::{cosine_similarity, embed_chunks, Embedder};
use crate::graph::GraphBuilder;
use crate::ingest::process_directory;
use crate::models::{GraphStatistics, IngestionOptions, LoadReport, PdfDocument};
use crate::questions::questions_from_document;
use crate::schema::{
    create_constraints, create_indexes, create_vector_index, verify_connection, VECTOR_INDEX_NAME,
};
use crate::syllabus::{extract_syllabus_structure, Syllabus};
use crate::traits::{CypherExecutor, PdfTranscriber};
use crate::{GraphError, IngestError};
use std::path::Path;
use tracing::{info, warn};

/// Below this similarity a text is filed under the fallback topic.
const MIN_TOPIC_SIMILARITY: f32 = 0.1;

struct TopicVector {
    subject: String,
    topic: String,
    vector: Vec<f32>,
}

/// Assigns a syllabus topic to free text by embedding similarity.
pub struct TopicClassifier<'a> {
    embedder: &'a dyn Embedder,
    topics: Vec<TopicVector>,
    fallback: (String, String),
}

impl<'a> TopicClassifier<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        syllabus: &Syllabus,
        fallback_subject: &str,
        fallback_topic: &str,
    ) -> Self {
        let topics = syllabus
            .topics()
            .map(|(subject, topic)| TopicVector {
                subject: subject.to_string(),
                topic: topic.name.clone(),
                vector: embedder.embed(&format!("{subject}: {}. {}", topic.name, topic.description)),
            })
            .collect();

        Self {
            embedder,
            topics,
            fallback: (fallback_subject.to_string(), fallback_topic.to_string()),
        }
    }

    /// `(subject, topic)` of the closest syllabus topic.
    pub fn classify(&self, text: &str) -> (String, String) {
        let vector = self.embedder.embed(text);
        let best = self
            .topics
            .iter()
            .map(|topic| (topic, cosine_similarity(&vector, &topic.vector)))
            .max_by(|left, right| left.1.total_cmp(&right.1));

        match best {
            Some((topic, score)) if score >= MIN_TOPIC_SIMILARITY => {
                (topic.subject.clone(), topic.topic.clone())
            }
            _ => self.fallback.clone(),
        }
    }
}

/// JSON syllabus, a syllabus PDF, or the built-in GATE CS outline when no
/// file is given.
pub fn resolve_syllabus(path: Option<&Path>) -> Result<Syllabus, IngestError> {
    let Some(path) = path else {
        return Ok(Syllabus::default_gate_cs());
    };

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    let syllabus = if is_pdf {
        extract_syllabus_structure(path)?
    } else {
        Syllabus::load(path)?
    };

    if syllabus.topic_count() == 0 {
        return Err(IngestError::InvalidArgument(format!(
            "syllabus {} has no topics",
            path.display()
        )));
    }
    Ok(syllabus)
}

/// Verifies the connection, then creates constraints, indexes and the chunk
/// vector index.
pub async fn setup_database(executor: &dyn CypherExecutor, dimension: usize) -> Result<(), GraphError> {
    verify_connection(executor).await?;
    let constraints = create_constraints(executor).await;
    let indexes = create_indexes(executor).await;
    let vector_index = create_vector_index(executor, VECTOR_INDEX_NAME, dimension).await?;
    info!(constraints, indexes, vector_index, dimension, "database setup finished");
    Ok(())
}

/// Loads syllabus, previous-year papers and textbooks into the graph.
pub struct DataLoader<'a> {
    builder: GraphBuilder<'a>,
    embedder: &'a dyn Embedder,
    transcriber: Option<&'a dyn PdfTranscriber>,
    syllabus: Syllabus,
    options: IngestionOptions,
}

impl<'a> DataLoader<'a> {
    pub fn new(
        executor: &'a dyn CypherExecutor,
        embedder: &'a dyn Embedder,
        syllabus: Syllabus,
        options: IngestionOptions,
    ) -> Self {
        Self {
            builder: GraphBuilder::new(executor, embedder),
            embedder,
            transcriber: None,
            syllabus,
            options,
        }
    }

    pub fn with_transcriber(mut self, transcriber: &'a dyn PdfTranscriber) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    fn classifier(&self) -> TopicClassifier<'a> {
        TopicClassifier::new(
            self.embedder,
            &self.syllabus,
            &self.options.default_subject,
            &self.options.default_topic,
        )
    }

    pub async fn load_syllabus(&self) -> Result<GraphStatistics, GraphError> {
        self.builder.load_syllabus(&self.syllabus).await
    }

    pub async fn load_pyqs(&self, dir: &Path) -> Result<LoadReport, IngestError> {
        let directory = process_directory(dir, self.transcriber).await;
        if directory.documents.is_empty() {
            warn!(dir = %dir.display(), "no question papers found");
        }
        self.load_pyq_documents(&directory.documents).await
    }

    /// Parses each paper, files every question under its closest topic and
    /// writes it to the graph.
    pub async fn load_pyq_documents(&self, documents: &[PdfDocument]) -> Result<LoadReport, IngestError> {
        let classifier = self.classifier();
        let mut questions = Vec::new();

        for document in documents {
            let mut parsed = questions_from_document(document)?;
            for question in &mut parsed {
                let (subject, topic) = classifier.classify(&question.full_text());
                question.subject = Some(subject);
                question.topic = Some(topic);
            }
            info!(file = %document.file_name, questions = parsed.len(), "paper parsed");
            questions.extend(parsed);
        }

        if questions.is_empty() {
            return Ok(LoadReport::default());
        }
        Ok(self.builder.load_pyqs(&questions).await)
    }

    pub async fn load_textbooks(&self, dir: &Path) -> Result<LoadReport, IngestError> {
        let directory = process_directory(dir, self.transcriber).await;
        self.load_textbook_documents(&directory.documents).await
    }

    /// Chunks each book, classifies every chunk on its own, then embeds and
    /// loads them in batches.
    pub async fn load_textbook_documents(
        &self,
        documents: &[PdfDocument],
    ) -> Result<LoadReport, IngestError> {
        let chunker = TextChunker::new(ChunkingConfig::from(&self.options))?;
        let classifier = self.classifier();
        let mut report = LoadReport::default();

        for document in documents {
            let mut chunks = chunker.chunk_document(document, None, None);
            for chunk in &mut chunks {
                let (subject, topic) = classifier.classify(&chunk.text);
                chunk.metadata.subject = Some(subject);
                chunk.metadata.topic = Some(topic);
            }
            embed_chunks(self.embedder, &mut chunks);

            let loaded = self
                .builder
                .load_textbook_chunks(&chunks, self.options.graph_batch_size)
                .await;
            info!(file = %document.file_name, chunks = chunks.len(), loaded = loaded.loaded, "textbook loaded");
            report.loaded += loaded.loaded;
            report.failed += loaded.failed;
        }

        Ok(report)
    }
}
