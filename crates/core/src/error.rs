use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("multimodal OCR failed: {0}")]
    OcrFailed(String),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("graph request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("model returned no text")]
    Empty,
}

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("flashcard store is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("card not found: {0}")]
    UnknownCard(String),

    #[error("rating must be between 1 and 4, got {0}")]
    InvalidRating(u8),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
