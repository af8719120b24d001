use crate::error::{GraphError, LlmError};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result record, keyed by the column names of the `RETURN` clause.
pub type Row = Map<String, Value>;

#[async_trait]
pub trait CypherExecutor: Send + Sync {
    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Row>, GraphError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
pub trait PdfTranscriber: Send + Sync {
    /// Returns the document text with pages separated by form feeds.
    async fn transcribe_pdf(&self, pdf: &[u8]) -> Result<String, LlmError>;
}
