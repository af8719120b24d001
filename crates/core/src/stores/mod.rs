pub mod gemini;
pub mod neo4j;

pub use gemini::{GeminiClient, GenerationConfig};
pub use neo4j::{decode_rows, rows_from_payload, Neo4jClient};
