use crate::embeddings::Embedder;
use crate::models::{GraphStatistics, LoadReport, Question, TextChunk};
use crate::schema::node_count;
use crate::syllabus::Syllabus;
use crate::traits::CypherExecutor;
use crate::GraphError;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Writes the syllabus, questions, chunks and concepts into the graph.
pub struct GraphBuilder<'a> {
    executor: &'a dyn CypherExecutor,
    embedder: &'a dyn Embedder,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(executor: &'a dyn CypherExecutor, embedder: &'a dyn Embedder) -> Self {
        Self { executor, embedder }
    }

    pub async fn create_subject(&self, name: &str, description: &str) -> Result<(), GraphError> {
        let cypher = r#"
            MERGE (s:Subject {name: $name})
            SET s.description = $description,
                s.updated_at = datetime()
            RETURN s.name AS name
        "#;
        self.executor
            .run(cypher, json!({"name": name, "description": description}))
            .await?;
        Ok(())
    }

    /// Returns false when the parent subject does not exist.
    pub async fn create_topic(
        &self,
        subject: &str,
        topic: &str,
        description: &str,
        difficulty: u8,
    ) -> Result<bool, GraphError> {
        let cypher = r#"
            MATCH (s:Subject {name: $subject})
            MERGE (t:Topic {name: $topic, subject: $subject})
            SET t.description = $description,
                t.difficulty_level = $difficulty,
                t.updated_at = datetime()
            MERGE (s)-[:HAS_TOPIC]->(t)
            RETURN t.name AS name
        "#;
        let rows = self
            .executor
            .run(
                cypher,
                json!({
                    "subject": subject,
                    "topic": topic,
                    "description": description,
                    "difficulty": difficulty,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn load_syllabus(&self, syllabus: &Syllabus) -> Result<GraphStatistics, GraphError> {
        for (name, subject) in &syllabus.subjects {
            self.create_subject(name, &subject.description).await?;
            for topic in &subject.topics {
                self.create_topic(name, &topic.name, &topic.description, topic.difficulty)
                    .await?;
            }
        }

        let statistics = self.statistics().await?;
        info!(
            subjects = statistics.subjects,
            topics = statistics.topics,
            "syllabus loaded"
        );
        Ok(statistics)
    }

    async fn topic_exists(&self, subject: &str, topic: &str) -> Result<bool, GraphError> {
        let rows = self
            .executor
            .run(
                "MATCH (t:Topic {name: $topic, subject: $subject}) RETURN t.name AS name LIMIT 1",
                json!({"subject": subject, "topic": topic}),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// `Ok(false)` when the question has no classification or its topic is
    /// not in the graph.
    pub async fn create_question(&self, question: &Question) -> Result<bool, GraphError> {
        let (Some(subject), Some(topic)) = (question.subject.as_deref(), question.topic.as_deref())
        else {
            warn!(number = question.number, year = question.year, "question has no topic");
            return Ok(false);
        };

        if !self.topic_exists(subject, topic).await? {
            warn!(subject, topic, "topic not found for question");
            return Ok(false);
        }

        let embedding = self.embedder.embed(&question.full_text());
        let cypher = r#"
            MATCH (t:Topic {name: $topic, subject: $subject})
            CREATE (q:Question {
                id: $id,
                number: $number,
                text: $text,
                year: $year,
                paper_set: $paper_set,
                options: $options,
                answer: $answer,
                difficulty: $difficulty,
                marks: $marks,
                embedding: $embedding,
                created_at: datetime()
            })
            MERGE (t)-[:HAS_QUESTION]->(q)
            RETURN q.id AS id
        "#;
        let rows = self
            .executor
            .run(
                cypher,
                json!({
                    "subject": subject,
                    "topic": topic,
                    "id": Uuid::new_v4().to_string(),
                    "number": question.number,
                    "text": question.text,
                    "year": question.year,
                    "paper_set": question.paper_set,
                    "options": question.options,
                    "answer": question.answer,
                    "difficulty": question.difficulty,
                    "marks": question.marks,
                    "embedding": embedding,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Loads every question, counting failures instead of stopping.
    pub async fn load_pyqs(&self, questions: &[Question]) -> LoadReport {
        let mut report = LoadReport::default();
        for question in questions {
            match self.create_question(question).await {
                Ok(true) => report.loaded += 1,
                Ok(false) => report.failed += 1,
                Err(error) => {
                    warn!(number = question.number, error = %error, "failed to load question");
                    report.failed += 1;
                }
            }
        }
        info!(loaded = report.loaded, failed = report.failed, "questions loaded");
        report
    }

    pub async fn create_chunk(&self, chunk: &TextChunk) -> Result<bool, GraphError> {
        let metadata = &chunk.metadata;
        let (Some(subject), Some(topic)) = (metadata.subject.as_deref(), metadata.topic.as_deref())
        else {
            warn!(chunk_id = %chunk.chunk_id, "chunk has no topic");
            return Ok(false);
        };

        if !self.topic_exists(subject, topic).await? {
            warn!(subject, topic, "topic not found for chunk");
            return Ok(false);
        }

        let embedding = match &chunk.embedding {
            Some(vector) if !vector.is_empty() => vector.clone(),
            _ => self.embedder.embed(&chunk.text),
        };

        let cypher = r#"
            MATCH (t:Topic {name: $topic, subject: $subject})
            CREATE (c:Chunk {
                chunk_id: $chunk_id,
                text: $text,
                source_file: $source_file,
                source_type: $source_type,
                page_number: $page_number,
                chunk_index: $chunk_index,
                embedding: $embedding,
                created_at: datetime()
            })
            MERGE (t)-[:EXPLAINED_BY]->(c)
            RETURN c.chunk_id AS chunk_id
        "#;
        let rows = self
            .executor
            .run(
                cypher,
                json!({
                    "subject": subject,
                    "topic": topic,
                    "chunk_id": chunk.chunk_id,
                    "text": chunk.text,
                    "source_file": metadata.source_file.as_deref().unwrap_or("unknown"),
                    "source_type": metadata.source_type.as_str(),
                    "page_number": chunk.page_number,
                    "chunk_index": chunk.chunk_index,
                    "embedding": embedding,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn load_textbook_chunks(&self, chunks: &[TextChunk], batch_size: usize) -> LoadReport {
        let mut report = LoadReport::default();
        for (batch_index, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
            for chunk in batch {
                match self.create_chunk(chunk).await {
                    Ok(true) => report.loaded += 1,
                    Ok(false) => report.failed += 1,
                    Err(error) => {
                        warn!(chunk_id = %chunk.chunk_id, error = %error, "failed to load chunk");
                        report.failed += 1;
                    }
                }
            }
            debug!(batch = batch_index, loaded = report.loaded, "chunk batch done");
        }
        info!(loaded = report.loaded, failed = report.failed, "textbook chunks loaded");
        report
    }

    pub async fn create_concept(
        &self,
        name: &str,
        explanation: &str,
        topic: &str,
        subject: &str,
    ) -> Result<bool, GraphError> {
        let cypher = r#"
            MATCH (t:Topic {name: $topic, subject: $subject})
            MERGE (c:Concept {name: $name, topic: $topic, subject: $subject})
            SET c.explanation = $explanation,
                c.updated_at = datetime()
            MERGE (t)-[:HAS_CONCEPT]->(c)
            RETURN c.name AS name
        "#;
        let rows = self
            .executor
            .run(
                cypher,
                json!({
                    "name": name,
                    "explanation": explanation,
                    "topic": topic,
                    "subject": subject,
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn statistics(&self) -> Result<GraphStatistics, GraphError> {
        Ok(GraphStatistics {
            subjects: node_count(self.executor, "Subject").await?,
            topics: node_count(self.executor, "Topic").await?,
            questions: node_count(self.executor, "Question").await?,
            chunks: node_count(self.executor, "Chunk").await?,
            concepts: node_count(self.executor, "Concept").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::ChunkMetadata;
    use crate::testing::{row, FailingExecutor, RecordingExecutor};
    use serde_json::Value;

    fn question(subject: Option<&str>, topic: Option<&str>) -> Question {
        Question {
            number: 7,
            text: "Which condition is not required for deadlock?".to_string(),
            options: vec!["(A) Mutual exclusion".to_string(), "(B) Preemption".to_string()],
            year: 2021,
            paper_set: "Set-1".to_string(),
            answer: "B".to_string(),
            difficulty: 2,
            marks: 1,
            subject: subject.map(str::to_string),
            topic: topic.map(str::to_string),
        }
    }

    /// Knows only the `Operating Systems / Deadlocks` topic and counts 2 of
    /// every label.
    fn graph_with_deadlocks() -> RecordingExecutor {
        RecordingExecutor::new(|statement, parameters| {
            if statement.contains("count(n)") {
                return vec![row(json!({"count": 2}))];
            }
            if parameters.get("topic") == Some(&json!("Deadlocks")) {
                vec![row(json!({"name": "Deadlocks", "id": "x", "chunk_id": "c"}))]
            } else {
                Vec::new()
            }
        })
    }

    #[tokio::test]
    async fn syllabus_loads_subjects_before_topics() -> Result<(), GraphError> {
        let executor = graph_with_deadlocks();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);

        let statistics = builder.load_syllabus(&Syllabus::default_gate_cs()).await?;

        assert_eq!(statistics.subjects, 2);
        let statements = executor.statements();
        assert!(statements[0].contains("MERGE (s:Subject {name: $name})"));
        assert!(statements[1].contains("MERGE (s)-[:HAS_TOPIC]->(t)"));
        let topic_writes = statements.iter().filter(|s| s.contains("HAS_TOPIC")).count();
        assert_eq!(topic_writes, 14);
        Ok(())
    }

    #[tokio::test]
    async fn question_is_embedded_and_linked_to_topic() -> Result<(), GraphError> {
        let executor = graph_with_deadlocks();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);

        let created = builder
            .create_question(&question(Some("Operating Systems"), Some("Deadlocks")))
            .await?;

        assert!(created);
        let parameters = executor.parameters();
        let write = &parameters[1];
        assert_eq!(write["embedding"].as_array().map(Vec::len), Some(8));
        assert_eq!(write["answer"], json!("B"));
        assert!(write["id"].as_str().is_some_and(|id| Uuid::parse_str(id).is_ok()));
        assert!(executor.statements()[1].contains("HAS_QUESTION"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_topic_is_not_an_error() -> Result<(), GraphError> {
        let executor = graph_with_deadlocks();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);

        assert!(!builder.create_question(&question(Some("Operating Systems"), Some("Paging"))).await?);
        assert!(!builder.create_question(&question(None, None)).await?);
        assert_eq!(executor.statements().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn pyq_report_counts_failures() {
        let executor = graph_with_deadlocks();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);

        let report = builder
            .load_pyqs(&[
                question(Some("Operating Systems"), Some("Deadlocks")),
                question(Some("Operating Systems"), Some("Paging")),
                question(None, None),
            ])
            .await;

        assert_eq!(report, LoadReport { loaded: 1, failed: 2 });
    }

    #[tokio::test]
    async fn backend_errors_count_as_failed_chunks() {
        let executor = FailingExecutor {
            needle: "CREATE (c:Chunk",
            inner: graph_with_deadlocks(),
        };
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);
        let chunk = TextChunk {
            chunk_id: "c1".to_string(),
            chunk_index: 0,
            text: "Banker's algorithm avoids deadlock.".to_string(),
            char_count: 35,
            word_count: 4,
            page_number: 3,
            metadata: ChunkMetadata {
                subject: Some("Operating Systems".to_string()),
                topic: Some("Deadlocks".to_string()),
                ..ChunkMetadata::default()
            },
            embedding: None,
        };

        let report = builder.load_textbook_chunks(&[chunk], 10).await;
        assert_eq!(report, LoadReport { loaded: 0, failed: 1 });
    }

    #[tokio::test]
    async fn attached_chunk_embedding_is_reused() -> Result<(), GraphError> {
        let executor = graph_with_deadlocks();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);
        let chunk = TextChunk {
            chunk_id: "c2".to_string(),
            chunk_index: 4,
            text: "Safe state".to_string(),
            char_count: 10,
            word_count: 2,
            page_number: 9,
            metadata: ChunkMetadata {
                subject: Some("Operating Systems".to_string()),
                topic: Some("Deadlocks".to_string()),
                source_file: Some("galvin.pdf".to_string()),
                ..ChunkMetadata::default()
            },
            embedding: Some(vec![0.5, 0.5]),
        };

        assert!(builder.create_chunk(&chunk).await?);
        let write = &executor.parameters()[1];
        assert_eq!(write["embedding"], json!([0.5, 0.5]));
        assert_eq!(write["source_type"], Value::from("textbook"));
        assert_eq!(write["source_file"], Value::from("galvin.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn concept_links_to_topic() -> Result<(), GraphError> {
        let executor = graph_with_deadlocks();
        let embedder = CharacterNgramEmbedder { dimensions: 8 };
        let builder = GraphBuilder::new(&executor, &embedder);

        assert!(
            builder
                .create_concept("Safe state", "No deadlock possible", "Deadlocks", "Operating Systems")
                .await?
        );
        assert!(executor.statements()[0].contains("HAS_CONCEPT"));
        Ok(())
    }
}
