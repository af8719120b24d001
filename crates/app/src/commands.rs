use crate::{Settings, TopicArgs};
use anyhow::{bail, Context};
use chrono::Utc;
use std::io::{self, BufRead, Write};
use std::path::Path;
use study_assistant_core::schema::clear_database;
use study_assistant_core::{
    resolve_syllabus, setup_database, CharacterNgramEmbedder, DataLoader, DeckError, Embedder,
    FlashcardDeck, GeminiClient, GenerationConfig, GraphBuilder, HybridRetriever,
    IngestionOptions, LearnSession, Neo4jClient, ProgressTracker, QuestionFilter, Rating, Tutor,
};
use tracing::{info, warn};

const EXPLANATION_CONTEXT_CHUNKS: usize = 3;
const READING_CHUNKS: usize = 10;
const PRACTICE_EXAMPLES: usize = 3;

pub struct App {
    settings: Settings,
    graph: Neo4jClient,
    embedder: CharacterNgramEmbedder,
}

impl App {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        if settings.neo4j_password.is_empty() {
            warn!("NEO4J_PASSWORD is empty");
        }
        let graph = Neo4jClient::new(
            &settings.neo4j_url,
            settings.neo4j_database.clone(),
            settings.neo4j_username.clone(),
            settings.neo4j_password.clone(),
        )
        .context("invalid NEO4J_URL")?;
        let embedder = CharacterNgramEmbedder {
            dimensions: settings.embedding_dimension,
        };
        Ok(Self {
            settings,
            graph,
            embedder,
        })
    }

    fn gemini(&self) -> anyhow::Result<GeminiClient> {
        let config = GenerationConfig {
            model: self.settings.gemini_model.clone(),
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_tokens,
        };
        GeminiClient::new(self.settings.gemini_api_key.as_deref(), config)
            .context("this command needs GEMINI_API_KEY")
    }

    fn retriever(&self) -> HybridRetriever<'_> {
        HybridRetriever::new(&self.graph, &self.embedder)
    }

    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_size: self.settings.chunk_size,
            chunk_overlap: self.settings.chunk_overlap,
            ..IngestionOptions::default()
        }
    }

    pub async fn setup(&self, reset: bool) -> anyhow::Result<()> {
        if reset {
            clear_database(&self.graph).await?;
            println!("database cleared");
        }
        setup_database(&self.graph, self.embedder.dimensions())
            .await
            .context("neo4j is not reachable")?;
        println!("schema ready");
        self.stats().await
    }

    pub async fn load(
        &self,
        syllabus: Option<&Path>,
        pyqs: Option<&Path>,
        textbooks: Option<&Path>,
        skip_syllabus: bool,
    ) -> anyhow::Result<()> {
        self.graph.verify_connection().await.context("neo4j is not reachable")?;

        let syllabus = resolve_syllabus(syllabus)?;
        let transcriber = match self.gemini() {
            Ok(client) => Some(client),
            Err(error) => {
                warn!(%error, "OCR fallback disabled");
                None
            }
        };

        let mut loader = DataLoader::new(&self.graph, &self.embedder, syllabus, self.ingestion_options());
        if let Some(transcriber) = transcriber.as_ref() {
            loader = loader.with_transcriber(transcriber);
        }

        if skip_syllabus {
            info!("syllabus load skipped");
        } else {
            let statistics = loader.load_syllabus().await?;
            println!(
                "syllabus: {} subjects, {} topics",
                statistics.subjects, statistics.topics
            );
        }

        if let Some(dir) = pyqs {
            let report = loader.load_pyqs(dir).await?;
            println!("questions: {} loaded, {} failed", report.loaded, report.failed);
        }
        if let Some(dir) = textbooks {
            let report = loader.load_textbooks(dir).await?;
            println!("chunks: {} loaded, {} failed", report.loaded, report.failed);
        }

        self.stats().await
    }

    pub async fn stats(&self) -> anyhow::Result<()> {
        let statistics = GraphBuilder::new(&self.graph, &self.embedder).statistics().await?;
        println!("subjects:  {}", statistics.subjects);
        println!("topics:    {}", statistics.topics);
        println!("questions: {}", statistics.questions);
        println!("chunks:    {}", statistics.chunks);
        println!("concepts:  {}", statistics.concepts);
        Ok(())
    }

    pub async fn subjects(&self) -> anyhow::Result<()> {
        let subjects = self.retriever().all_subjects().await?;
        if subjects.is_empty() {
            println!("no subjects loaded; run `study-assistant load` first");
        }
        for subject in subjects {
            println!("{subject}");
        }
        Ok(())
    }

    pub async fn topics(&self, subject: &str) -> anyhow::Result<()> {
        let topics = self.retriever().topics_for_subject(subject).await?;
        if topics.is_empty() {
            println!("no topics for {subject}");
        }
        for topic in topics {
            let difficulty = topic.difficulty.map_or_else(|| "-".to_string(), |d| d.to_string());
            println!(
                "{} (difficulty {difficulty}, {} questions)",
                topic.name, topic.question_count
            );
            if let Some(description) = topic.description.filter(|d| !d.is_empty()) {
                println!("    {description}");
            }
        }
        Ok(())
    }

    pub async fn learn(&self, scope: &TopicArgs, descending: bool, explain: bool) -> anyhow::Result<()> {
        let retriever = self.retriever();
        let questions = retriever
            .questions_ordered_by_difficulty(&scope.subject, &scope.topic, !descending)
            .await?;
        if questions.is_empty() {
            println!("no questions for {} / {}", scope.subject, scope.topic);
            return Ok(());
        }

        let gemini = if explain { Some(self.gemini()?) } else { None };
        let tracker = ProgressTracker::new(&self.graph);
        tracker.ensure_user().await?;

        let mut session = LearnSession::new(&scope.subject, &scope.topic, questions);
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        while let Some(question) = session.current().cloned() {
            let (done, total) = session.progress();
            println!("\n[{}/{}] {}", done + 1, total, question.question);
            for option in &question.options {
                println!("  {option}");
            }
            print!("answer (A-D, s to skip, q to quit): ");
            io::stdout().flush()?;

            let Some(line) = lines.next().transpose()? else {
                break;
            };
            let choice = line.trim();
            match choice {
                "q" | "Q" => break,
                "s" | "S" => {
                    session.skip();
                    continue;
                }
                _ => {}
            }

            let Some(outcome) = session.submit(choice, &tracker).await? else {
                break;
            };
            if outcome.is_correct {
                println!("correct");
                continue;
            }
            match outcome.expected {
                Some(letter) => println!("incorrect, the answer is {letter}"),
                None => println!("no answer key recorded for this question"),
            }

            if let Some(gemini) = gemini.as_ref() {
                let tutor = Tutor::new(gemini);
                match session
                    .explain_miss(&question, &retriever, &tutor, EXPLANATION_CONTEXT_CHUNKS)
                    .await
                {
                    Some(explanation) => println!("\n{explanation}"),
                    None => println!("(no explanation available, moving on)"),
                }
            }
        }

        let summary = session.summary();
        println!(
            "\nattempted {}, correct {}, accuracy {:.1}%",
            summary.attempted, summary.correct, summary.accuracy
        );
        Ok(())
    }

    pub async fn teach(&self, scope: &TopicArgs, query: &str, top_k: usize) -> anyhow::Result<()> {
        let gemini = self.gemini()?;
        let context = self
            .retriever()
            .hybrid_search(query, &scope.subject, &scope.topic, top_k)
            .await?;
        if context.topic_info.is_none() {
            warn!(subject = %scope.subject, topic = %scope.topic, "topic not in graph");
        }
        let answer = Tutor::new(&gemini)
            .teach(query, &scope.subject, &scope.topic, &context)
            .await?;
        println!("{answer}");
        Ok(())
    }

    pub async fn practice(&self, scope: &TopicArgs, count: usize, difficulty: u8) -> anyhow::Result<()> {
        let gemini = self.gemini()?;
        let filter = QuestionFilter {
            limit: PRACTICE_EXAMPLES,
            ..QuestionFilter::default()
        };
        let examples = self
            .retriever()
            .questions_by_topic(&scope.subject, &scope.topic, &filter)
            .await?;
        let questions = Tutor::new(&gemini)
            .generate_practice_questions(&scope.subject, &scope.topic, count, difficulty, &examples)
            .await?;

        if questions.is_empty() {
            bail!("the model reply contained no parseable questions");
        }
        for (index, question) in questions.iter().enumerate() {
            println!("\nQuestion {}: {}", index + 1, question.question);
            for option in &question.options {
                println!("  {option}");
            }
            println!("Answer: {}", question.answer);
            if !question.explanation.is_empty() {
                println!("Explanation: {}", question.explanation);
            }
        }
        Ok(())
    }

    pub async fn read(&self, scope: &TopicArgs) -> anyhow::Result<()> {
        let gemini = self.gemini()?;
        let query = format!("{}: {}", scope.subject, scope.topic);
        let chunks = self
            .retriever()
            .vector_search(&query, READING_CHUNKS, Some(&scope.subject), Some(&scope.topic))
            .await?;
        if chunks.is_empty() {
            bail!("no textbook chunks for {} / {}", scope.subject, scope.topic);
        }
        let material = Tutor::new(&gemini)
            .build_reading_material(&scope.subject, &scope.topic, &chunks)
            .await?;
        println!("{material}");
        Ok(())
    }

    pub async fn generate_flashcards(&self, scope: &TopicArgs, count: usize) -> anyhow::Result<()> {
        let gemini = self.gemini()?;
        let cards = Tutor::new(&gemini)
            .generate_flashcards(&scope.subject, &scope.topic, count)
            .await?;
        let generated = cards.len();
        let mut deck = FlashcardDeck::open(&self.settings.flashcard_store)?;
        let added = deck.add_cards(cards, Utc::now())?;
        println!("{generated} cards generated, {added} new");
        Ok(())
    }

    pub async fn review_flashcards(&self, subject: Option<&str>, topic: Option<&str>) -> anyhow::Result<()> {
        let mut deck = FlashcardDeck::open(&self.settings.flashcard_store)?;
        let due = deck
            .due_cards(subject, topic, Utc::now())
            .into_iter()
            .map(|stored| stored.card.clone())
            .collect::<Vec<_>>();
        if due.is_empty() {
            println!("no cards due");
            return Ok(());
        }

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        let mut reviewed = 0;

        for card in &due {
            println!("\n[{}] {}", card.topic, card.front);
            print!("press enter to reveal (q to quit) ");
            io::stdout().flush()?;
            match lines.next().transpose()? {
                Some(line) if line.trim().eq_ignore_ascii_case("q") => break,
                Some(_) => {}
                None => break,
            }
            println!("{}", card.back);

            let rating = loop {
                print!("rating 1=again 2=hard 3=good 4=easy: ");
                io::stdout().flush()?;
                let Some(line) = lines.next().transpose()? else {
                    return Ok(());
                };
                let parsed = line
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| DeckError::InvalidRating(0))
                    .and_then(Rating::try_from);
                match parsed {
                    Ok(rating) => break rating,
                    Err(error) => println!("{error}"),
                }
            };

            let next_due = deck.review_card(&card.id, rating, Utc::now())?.schedule.due;
            println!("next review {}", next_due.format("%Y-%m-%d %H:%M UTC"));
            reviewed += 1;
        }

        println!("\nreviewed {reviewed} of {} due cards", due.len());
        Ok(())
    }

    pub fn flashcard_stats(&self, subject: Option<&str>) -> anyhow::Result<()> {
        let deck = FlashcardDeck::open(&self.settings.flashcard_store)?;
        let stats = deck.stats(subject, Utc::now());
        println!("total:     {}", stats.total);
        println!("due:       {}", stats.due);
        println!("learned:   {}", stats.learned);
        println!("retention: {:.1}%", stats.retention_rate);
        Ok(())
    }

    pub async fn progress(&self, subject: Option<&str>, threshold: f64) -> anyhow::Result<()> {
        let tracker = ProgressTracker::new(&self.graph);
        let overall = tracker.user_stats(subject, None).await?;
        println!(
            "attempted {}, correct {}, accuracy {:.1}%",
            overall.attempted, overall.correct, overall.accuracy
        );

        if let Some(subject) = subject {
            println!("\ntopics in {subject}:");
            for topic in tracker.topic_progress(subject).await? {
                println!(
                    "  {:<30} {:>3}/{:<3} attempts  {:>5.1}%  ({} questions)",
                    topic.topic, topic.correct, topic.attempts, topic.accuracy, topic.total_questions
                );
            }
        }

        let weak = tracker.weak_topics(subject, threshold).await?;
        if weak.is_empty() {
            println!("\nno weak topics below {threshold:.0}%");
        } else {
            println!("\nweak topics:");
            for topic in weak {
                println!(
                    "  {} / {}: {:.1}% over {} attempts",
                    topic.subject, topic.topic, topic.accuracy, topic.attempts
                );
            }
        }
        Ok(())
    }
}
