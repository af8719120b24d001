use crate::models::{ChunkHit, Flashcard, GeneratedQuestion, HybridContext, QuestionRecord};
use crate::traits::LanguageModel;
use crate::LlmError;
use std::fmt::Write;
use tracing::{debug, info};

const EXPLANATION_CHUNKS: usize = 3;
const EXPLANATION_CHUNK_CHARS: usize = 200;
const TEACH_CHUNKS: usize = 5;
const TEACH_CHUNK_CHARS: usize = 300;
const PRACTICE_EXAMPLES: usize = 3;
const READING_CHUNKS: usize = 10;

const SEPARATOR: &str = "---";

/// Prompts the language model for explanations, lessons, practice questions,
/// reading material and flashcards.
pub struct Tutor<'a> {
    model: &'a dyn LanguageModel,
}

impl<'a> Tutor<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self { model }
    }

    pub async fn generate_explanation(
        &self,
        question: &str,
        answer: &str,
        subject: &str,
        topic: &str,
        context: &[ChunkHit],
    ) -> Result<String, LlmError> {
        let prompt = explanation_prompt(question, answer, subject, topic, context);
        self.model.generate(&prompt).await
    }

    pub async fn teach(
        &self,
        query: &str,
        subject: &str,
        topic: &str,
        context: &HybridContext,
    ) -> Result<String, LlmError> {
        let prompt = teach_prompt(query, subject, topic, context);
        self.model.generate(&prompt).await
    }

    pub async fn generate_practice_questions(
        &self,
        subject: &str,
        topic: &str,
        count: usize,
        difficulty: u8,
        examples: &[QuestionRecord],
    ) -> Result<Vec<GeneratedQuestion>, LlmError> {
        let prompt = practice_prompt(subject, topic, count, difficulty, examples);
        let reply = self.model.generate(&prompt).await?;
        let questions = parse_generated_questions(&reply);
        info!(requested = count, parsed = questions.len(), "practice questions generated");
        Ok(questions)
    }

    pub async fn build_reading_material(
        &self,
        subject: &str,
        topic: &str,
        chunks: &[ChunkHit],
    ) -> Result<String, LlmError> {
        let prompt = reading_prompt(subject, topic, chunks);
        self.model.generate(&prompt).await
    }

    pub async fn generate_flashcards(
        &self,
        subject: &str,
        topic: &str,
        count: usize,
    ) -> Result<Vec<Flashcard>, LlmError> {
        let prompt = flashcard_prompt(subject, topic, count);
        let reply = self.model.generate(&prompt).await?;
        let cards = parse_flashcards(&reply, subject, topic);
        info!(requested = count, parsed = cards.len(), "flashcards generated");
        Ok(cards)
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

pub fn explanation_prompt(
    question: &str,
    answer: &str,
    subject: &str,
    topic: &str,
    context: &[ChunkHit],
) -> String {
    let mut prompt = format!(
        "You are an expert tutor preparing students for the GATE Computer Science exam.\n\n\
         Subject: {subject}\nTopic: {topic}\n\n\
         Question: {question}\nCorrect Answer: {answer}\n\n"
    );

    if !context.is_empty() {
        prompt.push_str("\nRelevant study material:\n");
        for chunk in context.iter().take(EXPLANATION_CHUNKS) {
            let _ = writeln!(prompt, "- {}...", truncate_chars(&chunk.text, EXPLANATION_CHUNK_CHARS));
        }
    }

    prompt.push_str(
        "\nPlease provide a detailed explanation that:\n\
         1. Explains why the correct answer is right\n\
         2. Explains why other options are wrong (if applicable)\n\
         3. Provides the underlying concept with examples\n\
         4. Gives tips to remember this concept\n\n\
         Keep the explanation clear, concise, and helpful for exam preparation.\n",
    );
    prompt
}

pub fn teach_prompt(query: &str, subject: &str, topic: &str, context: &HybridContext) -> String {
    let info = context.topic_info.as_ref();
    let description = info
        .and_then(|info| info.description.as_deref())
        .unwrap_or("N/A");
    let difficulty = info
        .and_then(|info| info.difficulty)
        .map_or_else(|| "N/A".to_string(), |level| level.to_string());

    let mut prompt = format!(
        "You are an expert teacher for GATE Computer Science preparation.\n\n\
         Subject: {subject}\nTopic: {topic}\n\
         Topic Description: {description}\n\
         Difficulty Level: {difficulty}/5\n\n\
         Student's Question: {query}\n\n\
         Relevant Study Material:\n"
    );

    for (index, chunk) in context.relevant_chunks.iter().take(TEACH_CHUNKS).enumerate() {
        let _ = writeln!(
            prompt,
            "\n{}. {}...",
            index + 1,
            truncate_chars(&chunk.text, TEACH_CHUNK_CHARS)
        );
    }

    prompt.push_str(
        "\nBased on the above context, provide a comprehensive explanation that:\n\
         1. Directly answers the student's question\n\
         2. Explains the core concepts with clear examples\n\
         3. Relates concepts to real-world applications\n\
         4. Highlights key points for GATE exam preparation\n\
         5. Provides practice tips\n\n\
         Make the explanation engaging and easy to understand.\n",
    );
    prompt
}

pub fn practice_prompt(
    subject: &str,
    topic: &str,
    count: usize,
    difficulty: u8,
    examples: &[QuestionRecord],
) -> String {
    let mut prompt = format!(
        "You are creating GATE Computer Science practice questions.\n\n\
         Subject: {subject}\nTopic: {topic}\n\
         Difficulty Level: {difficulty}/5 (1=Easy, 5=Very Hard)\n\
         Number of Questions: {count}\n\n"
    );

    if !examples.is_empty() {
        prompt.push_str("\nExample questions from previous GATE papers:\n");
        for (index, example) in examples.iter().take(PRACTICE_EXAMPLES).enumerate() {
            let _ = writeln!(prompt, "\n{}. {}", index + 1, example.question);
            for option in &example.options {
                let _ = writeln!(prompt, "   {option}");
            }
        }
    }

    let _ = write!(
        prompt,
        "\nGenerate {count} multiple-choice questions similar to GATE pattern:\n\
         - Each question should test conceptual understanding\n\
         - Provide 4 options (A, B, C, D)\n\
         - Indicate the correct answer\n\
         - Provide a brief explanation\n\n\
         Format each question as:\n\
         Question [N]:\n\
         [Question text]\n\
         (A) [Option A]\n\
         (B) [Option B]\n\
         (C) [Option C]\n\
         (D) [Option D]\n\
         Correct Answer: [Letter]\n\
         Explanation: [Brief explanation]\n\n\
         {SEPARATOR}\n"
    );
    prompt
}

pub fn reading_prompt(subject: &str, topic: &str, chunks: &[ChunkHit]) -> String {
    let source = chunks
        .iter()
        .take(READING_CHUNKS)
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are creating study material for GATE Computer Science preparation.\n\n\
         Subject: {subject}\nTopic: {topic}\n\n\
         Source Material:\n{source}\n\n\
         Create a comprehensive, well-structured study guide that:\n\
         1. Starts with an introduction to the topic\n\
         2. Explains key concepts in a logical sequence\n\
         3. Provides examples and illustrations\n\
         4. Highlights important points for GATE exam\n\
         5. Ends with a summary of key takeaways\n\n\
         Structure the content with clear headings and subheadings.\n\
         Make it suitable for self-study and revision.\n"
    )
}

pub fn flashcard_prompt(subject: &str, topic: &str, count: usize) -> String {
    format!(
        "Create {count} flashcards for GATE Computer Science preparation.\n\n\
         Subject: {subject}\nTopic: {topic}\n\n\
         For each flashcard:\n\
         - Front: A clear, concise question or prompt\n\
         - Back: A detailed answer with key points\n\n\
         Format:\n\
         Card [N]:\n\
         Front: [Question]\n\
         Back: [Answer]\n\
         {SEPARATOR}\n"
    )
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Stem,
    Options,
    Answer,
    Explanation,
}

/// Blocks are separated by `---`; a block needs a stem and at least one
/// `(A)`..`(D)` option to count.
pub fn parse_generated_questions(text: &str) -> Vec<GeneratedQuestion> {
    let mut questions = Vec::new();

    for block in text.split(SEPARATOR) {
        if !block.contains("Question") {
            continue;
        }

        let mut question = GeneratedQuestion::default();
        let mut section = Section::Stem;

        for line in block.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if ["(A)", "(B)", "(C)", "(D)"].iter().any(|label| line.starts_with(label)) {
                question.options.push(line.to_string());
                section = Section::Options;
            } else if let Some(answer) = line.strip_prefix("Correct Answer:") {
                question.answer = answer.trim().to_string();
                section = Section::Answer;
            } else if let Some(explanation) = line.strip_prefix("Explanation:") {
                question.explanation = explanation.trim().to_string();
                section = Section::Explanation;
            } else if section == Section::Stem && !line.contains("Question") {
                append_line(&mut question.question, line);
            } else if section == Section::Explanation {
                append_line(&mut question.explanation, line);
            }
        }

        if !question.question.is_empty() && !question.options.is_empty() {
            questions.push(question);
        }
    }

    debug!(parsed = questions.len(), "generated questions parsed");
    questions
}

/// Cards keep the position of their block in the reply as part of the id.
pub fn parse_flashcards(text: &str, subject: &str, topic: &str) -> Vec<Flashcard> {
    let mut cards = Vec::new();

    for (index, block) in text.split(SEPARATOR).enumerate() {
        if !block.contains("Front:") || !block.contains("Back:") {
            continue;
        }

        let mut front = String::new();
        let mut back = String::new();
        let mut on_back = None;

        for line in block.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("Front:") {
                front = rest.trim().to_string();
                on_back = Some(false);
            } else if let Some(rest) = line.strip_prefix("Back:") {
                back = rest.trim().to_string();
                on_back = Some(true);
            } else {
                match on_back {
                    Some(false) => append_line(&mut front, line),
                    Some(true) => append_line(&mut back, line),
                    None => {}
                }
            }
        }

        if !front.is_empty() && !back.is_empty() {
            cards.push(Flashcard {
                id: format!("{subject}_{topic}_{index}"),
                subject: subject.to_string(),
                topic: topic.to_string(),
                front,
                back,
            });
        }
    }

    cards
}

fn append_line(target: &mut String, line: &str) {
    if line.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(line);
}
