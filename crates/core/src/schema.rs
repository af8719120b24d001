use crate::traits::CypherExecutor;
use crate::GraphError;
use serde_json::{json, Value};
use tracing::{info, warn};

pub const VECTOR_INDEX_NAME: &str = "chunk_embeddings";

const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT subject_name IF NOT EXISTS FOR (s:Subject) REQUIRE s.name IS UNIQUE",
    "CREATE CONSTRAINT topic_name_subject IF NOT EXISTS FOR (t:Topic) REQUIRE (t.name, t.subject) IS UNIQUE",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX subject_name IF NOT EXISTS FOR (s:Subject) ON (s.name)",
    "CREATE INDEX topic_name IF NOT EXISTS FOR (t:Topic) ON (t.name)",
    "CREATE INDEX topic_subject IF NOT EXISTS FOR (t:Topic) ON (t.subject)",
    "CREATE INDEX question_year IF NOT EXISTS FOR (q:Question) ON (q.year)",
    "CREATE INDEX question_difficulty IF NOT EXISTS FOR (q:Question) ON (q.difficulty)",
    "CREATE INDEX chunk_source IF NOT EXISTS FOR (c:Chunk) ON (c.source_type)",
    "CREATE INDEX concept_name IF NOT EXISTS FOR (c:Concept) ON (c.name)",
];

pub async fn verify_connection(executor: &dyn CypherExecutor) -> Result<(), GraphError> {
    let rows = executor.run("RETURN 1 AS ok", json!({})).await?;
    match rows.first().and_then(|row| row.get("ok")).and_then(Value::as_i64) {
        Some(1) => Ok(()),
        _ => Err(GraphError::Request("connectivity check returned no row".to_string())),
    }
}

/// Returns how many constraints were created; failures are logged and skipped.
pub async fn create_constraints(executor: &dyn CypherExecutor) -> usize {
    run_all(executor, CONSTRAINTS, "constraint").await
}

pub async fn create_indexes(executor: &dyn CypherExecutor) -> usize {
    run_all(executor, INDEXES, "index").await
}

async fn run_all(executor: &dyn CypherExecutor, statements: &[&str], kind: &str) -> usize {
    let mut created = 0;
    for statement in statements {
        match executor.run(statement, json!({})).await {
            Ok(_) => created += 1,
            Err(error) => warn!(kind, statement, error = %error, "schema statement failed"),
        }
    }
    info!(kind, created, total = statements.len(), "schema statements applied");
    created
}

/// Cosine vector index over `Chunk.embedding`.
pub async fn create_vector_index(
    executor: &dyn CypherExecutor,
    name: &str,
    dimension: usize,
) -> Result<bool, GraphError> {
    validate_identifier(name)?;
    let statement = format!(
        "CREATE VECTOR INDEX {name} IF NOT EXISTS \
         FOR (c:Chunk) ON (c.embedding) \
         OPTIONS {{indexConfig: {{`vector.dimensions`: {dimension}, `vector.similarity_function`: 'cosine'}}}}"
    );

    match executor.run(&statement, json!({})).await {
        Ok(_) => {
            info!(name, dimension, "vector index ready");
            Ok(true)
        }
        Err(error) => {
            warn!(name, error = %error, "vector index creation failed");
            Ok(false)
        }
    }
}

pub async fn clear_database(executor: &dyn CypherExecutor) -> Result<(), GraphError> {
    executor.run("MATCH (n) DETACH DELETE n", json!({})).await?;
    warn!("graph database cleared");
    Ok(())
}

pub async fn node_count(executor: &dyn CypherExecutor, label: &str) -> Result<u64, GraphError> {
    validate_identifier(label)?;
    let rows = executor
        .run(&format!("MATCH (n:{label}) RETURN count(n) AS count"), json!({}))
        .await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("count"))
        .and_then(Value::as_u64)
        .unwrap_or(0))
}

pub async fn labels(executor: &dyn CypherExecutor) -> Result<Vec<String>, GraphError> {
    let rows = executor.run("CALL db.labels() YIELD label RETURN label", json!({})).await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("label").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Labels and index names are spliced into Cypher, so only plain identifiers pass.
fn validate_identifier(name: &str) -> Result<(), GraphError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GraphError::Request(format!("invalid identifier: {name:?}")))
    }
}
