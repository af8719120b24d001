use crate::models::{QuestionRecord, UserStats};
use crate::progress::{accuracy, ProgressTracker};
use crate::questions::answer_letter;
use crate::retriever::HybridRetriever;
use crate::tutor::Tutor;
use crate::GraphError;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub question: String,
    pub chosen: Option<char>,
    pub expected: Option<char>,
    pub is_correct: bool,
}

/// Walks one topic's questions in difficulty order and keeps the score.
#[derive(Debug, Clone)]
pub struct LearnSession {
    subject: String,
    topic: String,
    questions: Vec<QuestionRecord>,
    position: usize,
    outcomes: Vec<AnswerOutcome>,
}

impl LearnSession {
    pub fn new(subject: impl Into<String>, topic: impl Into<String>, questions: Vec<QuestionRecord>) -> Self {
        Self {
            subject: subject.into(),
            topic: topic.into(),
            questions,
            position: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn current(&self) -> Option<&QuestionRecord> {
        self.questions.get(self.position)
    }

    /// `(answered or skipped, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.position, self.questions.len())
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.questions.len()
    }

    /// Grades `choice` against the current question by option letter and
    /// moves on. A question without a recorded answer is never correct.
    pub fn answer(&mut self, choice: &str) -> Option<AnswerOutcome> {
        let question = self.current()?;
        let chosen = answer_letter(choice);
        let expected = question.answer.as_deref().and_then(answer_letter);
        let outcome = AnswerOutcome {
            question: question.question.clone(),
            chosen,
            expected,
            is_correct: chosen.is_some() && chosen == expected,
        };

        self.position += 1;
        self.outcomes.push(outcome.clone());
        Some(outcome)
    }

    /// Grades the answer and stores the attempt in the graph.
    pub async fn submit(
        &mut self,
        choice: &str,
        tracker: &ProgressTracker<'_>,
    ) -> Result<Option<AnswerOutcome>, GraphError> {
        let Some(outcome) = self.answer(choice) else {
            return Ok(None);
        };
        tracker
            .record_attempt(&self.subject, &self.topic, &outcome.question, outcome.is_correct)
            .await?;
        Ok(Some(outcome))
    }

    /// Explains a missed question from the topic's closest chunks. A failed
    /// lookup falls back to no context and a failed model call gives `None`,
    /// so neither ends the session.
    pub async fn explain_miss(
        &self,
        question: &QuestionRecord,
        retriever: &HybridRetriever<'_>,
        tutor: &Tutor<'_>,
        context_chunks: usize,
    ) -> Option<String> {
        let context = retriever
            .vector_search(
                &question.question,
                context_chunks,
                Some(&self.subject),
                Some(&self.topic),
            )
            .await
            .unwrap_or_else(|error| {
                warn!(error = %error, "no context for explanation");
                Vec::new()
            });

        let answer = question.answer.as_deref().unwrap_or_default();
        match tutor
            .generate_explanation(&question.question, answer, &self.subject, &self.topic, &context)
            .await
        {
            Ok(explanation) => Some(explanation),
            Err(error) => {
                warn!(error = %error, "explanation unavailable");
                None
            }
        }
    }

    pub fn skip(&mut self) {
        if !self.is_finished() {
            self.position += 1;
        }
    }

    pub fn outcomes(&self) -> &[AnswerOutcome] {
        &self.outcomes
    }

    pub fn summary(&self) -> UserStats {
        let attempted = self.outcomes.len() as u64;
        let correct = self.outcomes.iter().filter(|outcome| outcome.is_correct).count() as u64;
        UserStats {
            attempted,
            correct,
            accuracy: accuracy(correct, attempted),
        }
    }
}
