use crate::embeddings::Embedder;
use crate::models::{ChunkHit, HybridContext, QuestionRecord, TopicInfo, TopicSummary};
use crate::schema::VECTOR_INDEX_NAME;
use crate::stores::decode_rows;
use crate::traits::CypherExecutor;
use crate::GraphError;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Over-fetch factor for filtered vector queries, since the topic filter runs
/// after the index returns its nearest neighbours.
const FILTERED_CANDIDATE_FACTOR: usize = 10;

const SAMPLE_CHUNKS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub year: Option<u16>,
    pub difficulty: Option<u8>,
    pub limit: usize,
}

/// Vector similarity over chunk embeddings combined with topic traversal.
pub struct HybridRetriever<'a> {
    executor: &'a dyn CypherExecutor,
    embedder: &'a dyn Embedder,
}

impl<'a> HybridRetriever<'a> {
    pub fn new(executor: &'a dyn CypherExecutor, embedder: &'a dyn Embedder) -> Self {
        Self { executor, embedder }
    }

    pub async fn vector_search(
        &self,
        query: &str,
        top_k: usize,
        subject: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Vec<ChunkHit>, GraphError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let filtered = subject.is_some() || topic.is_some();
        let candidates = if filtered {
            top_k * FILTERED_CANDIDATE_FACTOR
        } else {
            top_k
        };

        let mut cypher = format!(
            "CALL db.index.vector.queryNodes('{VECTOR_INDEX_NAME}', $candidates, $query_embedding) \
             YIELD node AS chunk, score\n"
        );
        if filtered {
            cypher.push_str("MATCH (chunk)<-[:EXPLAINED_BY]-(t:Topic)\n");
            let mut filters = Vec::new();
            if subject.is_some() {
                filters.push("t.subject = $subject");
            }
            if topic.is_some() {
                filters.push("t.name = $topic");
            }
            cypher.push_str(&format!("WHERE {}\n", filters.join(" AND ")));
        }
        cypher.push_str(
            "RETURN chunk.text AS text, chunk.source_file AS source, \
             chunk.page_number AS page, score\n\
             ORDER BY score DESC\n\
             LIMIT $top_k",
        );

        let rows = self
            .executor
            .run(
                &cypher,
                json!({
                    "query_embedding": self.embedder.embed(query),
                    "candidates": candidates,
                    "top_k": top_k,
                    "subject": subject,
                    "topic": topic,
                }),
            )
            .await?;
        let hits: Vec<ChunkHit> = decode_rows(rows)?;
        debug!(hits = hits.len(), top_k, filtered, "vector search done");
        Ok(hits)
    }

    /// `None` when the subject has no such topic.
    pub async fn graph_search(
        &self,
        subject: &str,
        topic: &str,
        include_concepts: bool,
    ) -> Result<Option<TopicInfo>, GraphError> {
        let mut cypher = String::from(
            "MATCH (s:Subject {name: $subject})-[:HAS_TOPIC]->(t:Topic {name: $topic})\n\
             OPTIONAL MATCH (t)-[:EXPLAINED_BY]->(chunk:Chunk)\n\
             OPTIONAL MATCH (t)-[:HAS_QUESTION]->(q:Question)\n",
        );
        if include_concepts {
            cypher.push_str("OPTIONAL MATCH (t)-[:HAS_CONCEPT]->(c:Concept)\n");
        }
        cypher.push_str(&format!(
            "RETURN t.name AS topic, t.description AS description, \
             t.difficulty_level AS difficulty, \
             collect(DISTINCT chunk.text)[0..{SAMPLE_CHUNKS}] AS sample_chunks, \
             count(DISTINCT q) AS question_count"
        ));
        if include_concepts {
            cypher.push_str(", collect(DISTINCT c.name) AS concepts");
        }

        let rows = self
            .executor
            .run(&cypher, json!({"subject": subject, "topic": topic}))
            .await?;
        Ok(decode_rows::<TopicInfo>(rows)?.into_iter().next())
    }

    pub async fn hybrid_search(
        &self,
        query: &str,
        subject: &str,
        topic: &str,
        top_k: usize,
    ) -> Result<HybridContext, GraphError> {
        let (relevant_chunks, topic_info) = tokio::try_join!(
            self.vector_search(query, top_k, Some(subject), Some(topic)),
            self.graph_search(subject, topic, true)
        )?;

        Ok(HybridContext {
            topic_info,
            relevant_chunks,
            search_query: query.to_string(),
        })
    }

    /// Newest first, then easiest first.
    pub async fn questions_by_topic(
        &self,
        subject: &str,
        topic: &str,
        filter: &QuestionFilter,
    ) -> Result<Vec<QuestionRecord>, GraphError> {
        let mut parameters = Map::new();
        parameters.insert("subject".to_string(), json!(subject));
        parameters.insert("topic".to_string(), json!(topic));
        parameters.insert("limit".to_string(), json!(filter.limit.max(1)));

        let mut cypher =
            String::from("MATCH (t:Topic {name: $topic, subject: $subject})-[:HAS_QUESTION]->(q:Question)\n");
        let mut clauses = Vec::new();
        // Year 0 marks papers whose date was unknown, so it never narrows the search.
        if let Some(year) = filter.year.filter(|year| *year != 0) {
            clauses.push("q.year = $year");
            parameters.insert("year".to_string(), json!(year));
        }
        if let Some(difficulty) = filter.difficulty.filter(|difficulty| *difficulty != 0) {
            clauses.push("q.difficulty = $difficulty");
            parameters.insert("difficulty".to_string(), json!(difficulty));
        }
        if !clauses.is_empty() {
            cypher.push_str(&format!("WHERE {}\n", clauses.join(" AND ")));
        }
        cypher.push_str(
            "RETURN q.text AS question, q.options AS options, q.answer AS answer, \
             q.year AS year, q.difficulty AS difficulty, q.marks AS marks, \
             q.paper_set AS paper_set\n\
             ORDER BY q.year DESC, q.difficulty ASC\n\
             LIMIT $limit",
        );

        let rows = self.executor.run(&cypher, Value::Object(parameters)).await?;
        decode_rows(rows)
    }

    pub async fn questions_ordered_by_difficulty(
        &self,
        subject: &str,
        topic: &str,
        ascending: bool,
    ) -> Result<Vec<QuestionRecord>, GraphError> {
        let order = if ascending { "ASC" } else { "DESC" };
        let cypher = format!(
            "MATCH (t:Topic {{name: $topic, subject: $subject}})-[:HAS_QUESTION]->(q:Question)\n\
             RETURN q.text AS question, q.options AS options, q.answer AS answer, \
             q.difficulty AS difficulty, q.year AS year, q.marks AS marks\n\
             ORDER BY q.difficulty {order}, q.year DESC"
        );
        let rows = self
            .executor
            .run(&cypher, json!({"subject": subject, "topic": topic}))
            .await?;
        decode_rows(rows)
    }

    pub async fn all_subjects(&self) -> Result<Vec<String>, GraphError> {
        let rows = self
            .executor
            .run("MATCH (s:Subject) RETURN s.name AS name ORDER BY name", json!({}))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    pub async fn topics_for_subject(&self, subject: &str) -> Result<Vec<TopicSummary>, GraphError> {
        let cypher = r#"
            MATCH (s:Subject {name: $subject})-[:HAS_TOPIC]->(t:Topic)
            OPTIONAL MATCH (t)-[:HAS_QUESTION]->(q:Question)
            RETURN t.name AS name,
                   t.description AS description,
                   t.difficulty_level AS difficulty,
                   count(DISTINCT q) AS question_count
            ORDER BY t.name
        "#;
        let rows = self.executor.run(cypher, json!({"subject": subject})).await?;
        decode_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::testing::{row, RecordingExecutor};

    fn embedder() -> CharacterNgramEmbedder {
        CharacterNgramEmbedder { dimensions: 8 }
    }

    #[tokio::test]
    async fn unfiltered_vector_search_skips_topic_match() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|_, _| {
            vec![row(json!({"text": "Paging maps pages to frames.", "source": "os.pdf", "page": 12, "score": 0.91}))]
        });
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        let hits = retriever.vector_search("what is paging", 3, None, None).await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page, Some(12));
        let statement = &executor.statements()[0];
        assert!(statement.contains("queryNodes('chunk_embeddings'"));
        assert!(!statement.contains("EXPLAINED_BY"));
        assert_eq!(executor.parameters()[0]["candidates"], json!(3));
        Ok(())
    }

    #[tokio::test]
    async fn filtered_vector_search_overfetches() -> Result<(), GraphError> {
        let executor = RecordingExecutor::empty();
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        retriever
            .vector_search("tlb", 5, Some("Operating Systems"), None)
            .await?;

        let statement = &executor.statements()[0];
        assert!(statement.contains("WHERE t.subject = $subject\n"));
        assert!(!statement.contains("t.name = $topic"));
        assert_eq!(executor.parameters()[0]["candidates"], json!(50));
        Ok(())
    }

    #[tokio::test]
    async fn blank_query_does_not_hit_the_index() -> Result<(), GraphError> {
        let executor = RecordingExecutor::empty();
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);
        assert!(retriever.vector_search("  ", 5, None, None).await?.is_empty());
        assert!(executor.statements().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn hybrid_search_combines_both_sides() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|statement, _| {
            if statement.contains("queryNodes") {
                vec![row(json!({"text": "Banker's algorithm", "source": null, "page": null, "score": 0.7}))]
            } else {
                vec![row(json!({
                    "topic": "Deadlocks",
                    "description": "Deadlock handling strategies",
                    "difficulty": 3,
                    "sample_chunks": ["Safe state"],
                    "question_count": 4,
                    "concepts": ["Safe state"]
                }))]
            }
        });
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        let context = retriever
            .hybrid_search("avoid deadlock", "Operating Systems", "Deadlocks", 5)
            .await?;

        assert_eq!(context.search_query, "avoid deadlock");
        assert_eq!(context.relevant_chunks[0].source, None);
        let info = context.topic_info.expect("topic info");
        assert_eq!(info.question_count, 4);
        assert_eq!(info.difficulty, Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_topic_yields_no_info() -> Result<(), GraphError> {
        let executor = RecordingExecutor::empty();
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);
        assert_eq!(retriever.graph_search("Algorithms", "Nope", false).await?, None);
        assert!(!executor.statements()[0].contains("Concept"));
        Ok(())
    }

    #[tokio::test]
    async fn question_filters_become_parameters() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|_, _| {
            vec![row(json!({
                "question": "Which page replacement suffers Belady's anomaly?",
                "options": ["(A) FIFO", "(B) LRU"],
                "answer": "A",
                "year": 2019,
                "difficulty": 2,
                "marks": 1,
                "paper_set": "Set-1"
            }))]
        });
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        let filter = QuestionFilter {
            year: Some(2019),
            difficulty: None,
            limit: 10,
        };
        let questions = retriever
            .questions_by_topic("Operating Systems", "Memory Management", &filter)
            .await?;

        assert_eq!(questions[0].options.len(), 2);
        let statement = &executor.statements()[0];
        assert!(statement.contains("WHERE q.year = $year\n"));
        assert!(statement.contains("ORDER BY q.year DESC, q.difficulty ASC"));
        let parameters = &executor.parameters()[0];
        assert_eq!(parameters["year"], json!(2019));
        assert!(parameters.get("difficulty").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn zero_year_and_difficulty_do_not_filter() -> Result<(), GraphError> {
        let executor = RecordingExecutor::empty();
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        let filter = QuestionFilter {
            year: Some(0),
            difficulty: Some(0),
            limit: 5,
        };
        retriever
            .questions_by_topic("Algorithms", "Sorting", &filter)
            .await?;

        assert!(!executor.statements()[0].contains("WHERE"));
        let parameters = &executor.parameters()[0];
        assert!(parameters.get("year").is_none());
        assert!(parameters.get("difficulty").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn difficulty_order_follows_direction() -> Result<(), GraphError> {
        let executor = RecordingExecutor::empty();
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        retriever
            .questions_ordered_by_difficulty("Algorithms", "Sorting", false)
            .await?;
        assert!(executor.statements()[0].contains("ORDER BY q.difficulty DESC, q.year DESC"));
        Ok(())
    }

    #[tokio::test]
    async fn subjects_and_topics_are_listed() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|statement, _| {
            if statement.contains("HAS_TOPIC") {
                vec![row(json!({"name": "Sorting", "description": null, "difficulty": 2, "question_count": 0}))]
            } else {
                vec![row(json!({"name": "Algorithms"})), row(json!({"name": "Compiler Design"}))]
            }
        });
        let embedder = embedder();
        let retriever = HybridRetriever::new(&executor, &embedder);

        assert_eq!(retriever.all_subjects().await?, vec!["Algorithms", "Compiler Design"]);
        let topics = retriever.topics_for_subject("Algorithms").await?;
        assert_eq!(topics[0].name, "Sorting");
        assert_eq!(topics[0].description, None);
        Ok(())
    }
}
