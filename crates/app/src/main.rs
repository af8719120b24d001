mod commands;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "study-assistant", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

/// Connection and tuning settings; every flag can also come from the environment.
#[derive(Args, Clone)]
pub struct Settings {
    /// Neo4j HTTP base URL
    #[arg(long, env = "NEO4J_URL", default_value = "http://localhost:7474", global = true)]
    pub neo4j_url: String,

    /// Neo4j database name
    #[arg(long, env = "NEO4J_DATABASE", default_value = "neo4j", global = true)]
    pub neo4j_database: String,

    /// Neo4j username
    #[arg(long, env = "NEO4J_USERNAME", default_value = "neo4j", global = true)]
    pub neo4j_username: String,

    /// Neo4j password
    #[arg(long, env = "NEO4J_PASSWORD", default_value = "", hide_env_values = true, global = true)]
    pub neo4j_password: String,

    /// Gemini API key; LLM commands and OCR fallback need it
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash", global = true)]
    pub gemini_model: String,

    /// Maximum output tokens per LLM response
    #[arg(long, env = "MAX_TOKENS", default_value_t = 2000, global = true)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, env = "TEMPERATURE", default_value_t = 0.0, global = true)]
    pub temperature: f32,

    /// Chunk size in characters
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 500, global = true)]
    pub chunk_size: usize,

    /// Overlap between neighbouring chunks in characters
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 100, global = true)]
    pub chunk_overlap: usize,

    /// Embedding vector dimension
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value_t = 384, global = true)]
    pub embedding_dimension: usize,

    /// Flashcard store location
    #[arg(
        long,
        env = "FLASHCARD_STORE",
        default_value = "data/processed/flashcards.json",
        global = true
    )]
    pub flashcard_store: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Create constraints, indexes and the chunk vector index.
    Setup {
        /// Delete every node first.
        #[arg(long, default_value_t = false)]
        reset: bool,
    },
    /// Load the syllabus, previous-year papers and textbooks into the graph.
    Load {
        /// Syllabus as JSON or PDF; the built-in GATE CS outline otherwise.
        #[arg(long)]
        syllabus: Option<PathBuf>,
        /// Folder of previous-year question papers.
        #[arg(long)]
        pyqs: Option<PathBuf>,
        /// Folder of textbooks.
        #[arg(long)]
        textbooks: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        skip_syllabus: bool,
    },
    /// Node counts per label.
    Stats,
    /// List subjects.
    Subjects,
    /// List the topics of a subject.
    Topics {
        #[arg(long)]
        subject: String,
    },
    /// Answer a topic's previous-year questions, easiest first.
    Learn {
        #[command(flatten)]
        scope: TopicArgs,
        /// Hardest questions first.
        #[arg(long, default_value_t = false)]
        descending: bool,
        /// Ask the tutor to explain every wrong answer.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Ask the tutor a question about a topic.
    Teach {
        #[command(flatten)]
        scope: TopicArgs,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Generate new practice questions for a topic.
    Practice {
        #[command(flatten)]
        scope: TopicArgs,
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=5))]
        difficulty: u8,
    },
    /// Build reading material for a topic from the loaded textbooks.
    Read {
        #[command(flatten)]
        scope: TopicArgs,
    },
    /// Generate, review and inspect flashcards.
    Flashcards {
        #[command(subcommand)]
        action: FlashcardAction,
    },
    /// Accuracy overall, per topic and the weakest topics.
    Progress {
        #[arg(long)]
        subject: Option<String>,
        /// Accuracy percentage below which a topic counts as weak.
        #[arg(long, default_value_t = 60.0)]
        threshold: f64,
    },
}

#[derive(Args, Clone)]
pub struct TopicArgs {
    #[arg(long)]
    pub subject: String,
    #[arg(long)]
    pub topic: String,
}

#[derive(Subcommand)]
enum FlashcardAction {
    /// Ask the tutor for new cards and add them to the store.
    Generate {
        #[command(flatten)]
        scope: TopicArgs,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
    /// Review the cards that are due.
    Review {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        topic: Option<String>,
    },
    Stats {
        #[arg(long)]
        subject: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "study-assistant boot"
    );

    let app = commands::App::new(cli.settings)?;

    match cli.command {
        Command::Setup { reset } => app.setup(reset).await,
        Command::Load {
            syllabus,
            pyqs,
            textbooks,
            skip_syllabus,
        } => {
            app.load(syllabus.as_deref(), pyqs.as_deref(), textbooks.as_deref(), skip_syllabus)
                .await
        }
        Command::Stats => app.stats().await,
        Command::Subjects => app.subjects().await,
        Command::Topics { subject } => app.topics(&subject).await,
        Command::Learn {
            scope,
            descending,
            explain,
        } => app.learn(&scope, descending, explain).await,
        Command::Teach { scope, query, top_k } => app.teach(&scope, &query, top_k).await,
        Command::Practice {
            scope,
            count,
            difficulty,
        } => app.practice(&scope, count, difficulty).await,
        Command::Read { scope } => app.read(&scope).await,
        Command::Flashcards { action } => match action {
            FlashcardAction::Generate { scope, count } => app.generate_flashcards(&scope, count).await,
            FlashcardAction::Review { subject, topic } => {
                app.review_flashcards(subject.as_deref(), topic.as_deref()).await
            }
            FlashcardAction::Stats { subject } => app.flashcard_stats(subject.as_deref()),
        },
        Command::Progress { subject, threshold } => app.progress(subject.as_deref(), threshold).await,
    }
}
