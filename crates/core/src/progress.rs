use crate::models::{TopicProgress, UserStats, WeakTopic};
use crate::stores::decode_rows;
use crate::traits::{CypherExecutor, Row};
use crate::GraphError;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const DEFAULT_USER: &str = "default_user";
pub const DEFAULT_WEAK_THRESHOLD: f64 = 60.0;
const MIN_ATTEMPTS_FOR_WEAKNESS: u64 = 3;
const WEAK_TOPIC_LIMIT: usize = 10;

/// Per-question attempt counters kept on `ATTEMPTED` relationships.
pub struct ProgressTracker<'a> {
    executor: &'a dyn CypherExecutor,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(executor: &'a dyn CypherExecutor) -> Self {
        Self { executor }
    }

    pub async fn ensure_user(&self) -> Result<(), GraphError> {
        self.executor
            .run(
                "MERGE (u:User {id: $user}) \
                 SET u.created_at = coalesce(u.created_at, datetime()) \
                 RETURN u.id AS id",
                json!({"user": DEFAULT_USER}),
            )
            .await?;
        Ok(())
    }

    /// Returns false when no question with that text exists under the topic.
    pub async fn record_attempt(
        &self,
        subject: &str,
        topic: &str,
        question_text: &str,
        is_correct: bool,
    ) -> Result<bool, GraphError> {
        let cypher = r#"
            MATCH (u:User {id: $user})
            MATCH (t:Topic {name: $topic, subject: $subject})
            MATCH (t)-[:HAS_QUESTION]->(q:Question {text: $question_text})
            MERGE (u)-[a:ATTEMPTED]->(q)
            ON CREATE SET
                a.first_attempt = datetime(),
                a.last_attempt = datetime(),
                a.attempt_count = 1,
                a.correct_count = CASE WHEN $is_correct THEN 1 ELSE 0 END,
                a.last_correct = CASE WHEN $is_correct THEN datetime() ELSE null END
            ON MATCH SET
                a.last_attempt = datetime(),
                a.attempt_count = a.attempt_count + 1,
                a.correct_count = a.correct_count + CASE WHEN $is_correct THEN 1 ELSE 0 END,
                a.last_correct = CASE WHEN $is_correct THEN datetime() ELSE a.last_correct END
            RETURN a.attempt_count AS attempts
        "#;
        let rows = self
            .executor
            .run(
                cypher,
                json!({
                    "user": DEFAULT_USER,
                    "subject": subject,
                    "topic": topic,
                    "question_text": question_text,
                    "is_correct": is_correct,
                }),
            )
            .await?;

        if rows.is_empty() {
            warn!(subject, topic, "attempt not recorded, question not found");
            return Ok(false);
        }
        debug!(subject, topic, is_correct, "attempt recorded");
        Ok(true)
    }

    /// Totals over everything, one subject, or one topic of a subject.
    pub async fn user_stats(
        &self,
        subject: Option<&str>,
        topic: Option<&str>,
    ) -> Result<UserStats, GraphError> {
        let scope = match (subject, topic) {
            (Some(_), Some(_)) => {
                "MATCH (q)<-[:HAS_QUESTION]-(t:Topic {name: $topic, subject: $subject})\n"
            }
            (Some(_), None) => "MATCH (q)<-[:HAS_QUESTION]-(t:Topic {subject: $subject})\n",
            _ => "",
        };
        let cypher = format!(
            "MATCH (u:User {{id: $user}})-[a:ATTEMPTED]->(q:Question)\n\
             {scope}\
             RETURN sum(a.attempt_count) AS attempted, sum(a.correct_count) AS correct"
        );

        let rows = self
            .executor
            .run(
                &cypher,
                json!({"user": DEFAULT_USER, "subject": subject, "topic": topic}),
            )
            .await?;

        let Some(row) = rows.first() else {
            return Ok(UserStats::default());
        };
        let attempted = count(row, "attempted");
        let correct = count(row, "correct");
        Ok(UserStats {
            attempted,
            correct,
            accuracy: accuracy(correct, attempted),
        })
    }

    pub async fn topic_progress(&self, subject: &str) -> Result<Vec<TopicProgress>, GraphError> {
        let cypher = r#"
            MATCH (t:Topic {subject: $subject})
            OPTIONAL MATCH (t)-[:HAS_QUESTION]->(q:Question)
            OPTIONAL MATCH (q)<-[a:ATTEMPTED]-(:User {id: $user})
            WITH t,
                 count(DISTINCT q) AS total_questions,
                 coalesce(sum(a.attempt_count), 0) AS attempts,
                 coalesce(sum(a.correct_count), 0) AS correct
            RETURN t.name AS topic,
                   t.difficulty_level AS difficulty,
                   total_questions,
                   attempts,
                   correct,
                   CASE WHEN attempts > 0 THEN toFloat(correct) / attempts * 100 ELSE 0.0 END AS accuracy
            ORDER BY t.name
        "#;
        let rows = self
            .executor
            .run(cypher, json!({"user": DEFAULT_USER, "subject": subject}))
            .await?;

        let mut progress: Vec<TopicProgress> = decode_rows(rows)?;
        for topic in &mut progress {
            topic.accuracy = round_tenth(topic.accuracy);
        }
        Ok(progress)
    }

    /// Topics with enough attempts and accuracy under `threshold`, worst first.
    pub async fn weak_topics(
        &self,
        subject: Option<&str>,
        threshold: f64,
    ) -> Result<Vec<WeakTopic>, GraphError> {
        let filter = if subject.is_some() {
            "WHERE t.subject = $subject\n"
        } else {
            ""
        };
        let cypher = format!(
            "MATCH (t:Topic)\n\
             {filter}\
             MATCH (t)-[:HAS_QUESTION]->(q:Question)<-[a:ATTEMPTED]-(:User {{id: $user}})\n\
             WITH t, sum(a.attempt_count) AS attempts, sum(a.correct_count) AS correct\n\
             WITH t, attempts, correct, toFloat(correct) / attempts * 100 AS accuracy\n\
             WHERE attempts >= $min_attempts AND accuracy < $threshold\n\
             RETURN t.name AS topic, t.subject AS subject, t.difficulty_level AS difficulty, \
             attempts, correct, accuracy\n\
             ORDER BY accuracy ASC, attempts DESC\n\
             LIMIT $limit"
        );

        let rows = self
            .executor
            .run(
                &cypher,
                json!({
                    "user": DEFAULT_USER,
                    "subject": subject,
                    "threshold": threshold,
                    "min_attempts": MIN_ATTEMPTS_FOR_WEAKNESS,
                    "limit": WEAK_TOPIC_LIMIT,
                }),
            )
            .await?;

        let mut weak: Vec<WeakTopic> = decode_rows(rows)?;
        for topic in &mut weak {
            topic.accuracy = round_tenth(topic.accuracy);
        }
        Ok(weak)
    }
}

fn count(row: &Row, column: &str) -> u64 {
    row.get(column).and_then(Value::as_u64).unwrap_or(0)
}

/// Percentage rounded to one decimal; zero attempts give zero.
pub fn accuracy(correct: u64, attempted: u64) -> f64 {
    if attempted == 0 {
        0.0
    } else {
        round_tenth(correct as f64 / attempted as f64 * 100.0)
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{row, RecordingExecutor};

    #[tokio::test]
    async fn stats_scope_follows_filters() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|_, _| vec![row(json!({"attempted": 3, "correct": 2}))]);
        let tracker = ProgressTracker::new(&executor);

        let overall = tracker.user_stats(None, None).await?;
        tracker.user_stats(Some("Algorithms"), None).await?;
        tracker.user_stats(Some("Algorithms"), Some("Sorting")).await?;

        assert_eq!(overall, UserStats { attempted: 3, correct: 2, accuracy: 66.7 });
        let statements = executor.statements();
        assert!(!statements[0].contains("Topic"));
        assert!(statements[1].contains("Topic {subject: $subject}"));
        assert!(statements[2].contains("Topic {name: $topic, subject: $subject}"));
        Ok(())
    }

    #[tokio::test]
    async fn stats_without_attempts_are_zero() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|_, _| vec![row(json!({"attempted": 0, "correct": 0}))]);
        let tracker = ProgressTracker::new(&executor);
        assert_eq!(tracker.user_stats(None, None).await?, UserStats::default());
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_attempt_reports_false() -> Result<(), GraphError> {
        let executor = RecordingExecutor::empty();
        let tracker = ProgressTracker::new(&executor);

        let recorded = tracker
            .record_attempt("Algorithms", "Sorting", "Which sort is stable?", true)
            .await?;

        assert!(!recorded);
        let parameters = &executor.parameters()[0];
        assert_eq!(parameters["is_correct"], json!(true));
        assert_eq!(parameters["user"], json!(DEFAULT_USER));
        assert!(executor.statements()[0].contains("ON MATCH SET"));
        Ok(())
    }

    #[tokio::test]
    async fn weak_topics_are_rounded_and_filtered_by_subject() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|_, _| {
            vec![row(json!({
                "topic": "Normalization",
                "subject": "Database Management Systems",
                "difficulty": 3,
                "attempts": 6,
                "correct": 2,
                "accuracy": 33.333333
            }))]
        });
        let tracker = ProgressTracker::new(&executor);

        let weak = tracker
            .weak_topics(Some("Database Management Systems"), DEFAULT_WEAK_THRESHOLD)
            .await?;

        assert_eq!(weak[0].accuracy, 33.3);
        assert!(executor.statements()[0].contains("WHERE t.subject = $subject"));
        assert_eq!(executor.parameters()[0]["limit"], json!(10));
        Ok(())
    }

    #[tokio::test]
    async fn topic_progress_decodes_rows() -> Result<(), GraphError> {
        let executor = RecordingExecutor::new(|_, _| {
            vec![row(json!({
                "topic": "Paging",
                "difficulty": null,
                "total_questions": 4,
                "attempts": 3,
                "correct": 1,
                "accuracy": 33.33
            }))]
        });
        let tracker = ProgressTracker::new(&executor);

        let progress = tracker.topic_progress("Operating Systems").await?;
        assert_eq!(progress[0].total_questions, 4);
        assert_eq!(progress[0].difficulty, None);
        assert_eq!(progress[0].accuracy, 33.3);
        Ok(())
    }

    #[test]
    fn accuracy_rounds_to_one_decimal() {
        assert_eq!(accuracy(1, 3), 33.3);
        assert_eq!(accuracy(0, 0), 0.0);
        assert_eq!(accuracy(5, 5), 100.0);
    }
}
