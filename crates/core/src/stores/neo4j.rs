use crate::traits::{CypherExecutor, Row};
use crate::GraphError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;

/// Neo4j over the HTTP transactional endpoint.
pub struct Neo4jClient {
    endpoint: Url,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jClient {
    pub fn new(
        endpoint: &str,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            client: Client::new(),
        })
    }

    fn tx_url(&self) -> Result<Url, GraphError> {
        Ok(self
            .endpoint
            .join(&format!("db/{}/tx/commit", self.database))?)
    }

    pub async fn verify_connection(&self) -> Result<(), GraphError> {
        crate::schema::verify_connection(self).await?;
        info!(endpoint = %self.endpoint, database = %self.database, "connected to neo4j");
        Ok(())
    }
}

#[async_trait]
impl CypherExecutor for Neo4jClient {
    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Row>, GraphError> {
        let response = self
            .client
            .post(self.tx_url()?)
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "statements": [
                    {
                        "statement": statement,
                        "parameters": parameters
                    }
                ]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GraphError::BackendResponse {
                backend: "neo4j".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        let rows = rows_from_payload(&body)?;
        debug!(row_count = rows.len(), "cypher statement committed");
        Ok(rows)
    }
}

/// Rebuilds keyed rows from the `columns` + `data[].row` layout; any entry in
/// `errors` fails the whole call.
pub fn rows_from_payload(payload: &Value) -> Result<Vec<Row>, GraphError> {
    if let Some(errors) = payload.pointer("/errors").and_then(Value::as_array) {
        if let Some(first) = errors.first() {
            let code = first.pointer("/code").and_then(Value::as_str).unwrap_or("unknown");
            let message = first.pointer("/message").and_then(Value::as_str).unwrap_or_default();
            return Err(GraphError::BackendResponse {
                backend: "neo4j".to_string(),
                details: format!("{code}: {message}"),
            });
        }
    }

    let mut rows = Vec::new();
    let results = payload
        .pointer("/results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for result in results {
        let columns = result
            .pointer("/columns")
            .and_then(Value::as_array)
            .map(|columns| {
                columns
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let data = result
            .pointer("/data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for entry in data {
            let Some(values) = entry.pointer("/row").and_then(Value::as_array) else {
                continue;
            };
            let row = columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect::<Map<String, Value>>();
            rows.push(row);
        }
    }

    Ok(rows)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, GraphError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(GraphError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopicSummary;

    #[test]
    fn rows_are_keyed_by_column_name() -> Result<(), GraphError> {
        let payload = json!({
            "results": [{
                "columns": ["name", "question_count"],
                "data": [
                    {"row": ["Paging", 3], "meta": [null, null]},
                    {"row": ["Deadlocks", 0], "meta": [null, null]}
                ]
            }],
            "errors": []
        });

        let rows = rows_from_payload(&payload)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("Paging"));

        let topics: Vec<TopicSummary> = decode_rows(rows)?;
        assert_eq!(topics[1].name, "Deadlocks");
        assert_eq!(topics[1].description, None);
        Ok(())
    }

    #[test]
    fn error_entries_fail_the_call() {
        let payload = json!({
            "results": [],
            "errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "bad"}]
        });

        match rows_from_payload(&payload) {
            Err(GraphError::BackendResponse { details, .. }) => {
                assert_eq!(details, "Neo.ClientError.Statement.SyntaxError: bad");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn transaction_url_joins_database_path() -> Result<(), GraphError> {
        let client = Neo4jClient::new("http://localhost:7474/", "study", "neo4j", "secret")?;
        assert_eq!(client.tx_url()?.as_str(), "http://localhost:7474/db/study/tx/commit");
        Ok(())
    }

    #[test]
    fn base_path_without_trailing_slash_is_kept() -> Result<(), GraphError> {
        let client = Neo4jClient::new("https://proxy.example.com/neo4j", "neo4j", "neo4j", "secret")?;
        assert_eq!(
            client.tx_url()?.as_str(),
            "https://proxy.example.com/neo4j/db/neo4j/tx/commit"
        );
        Ok(())
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            Neo4jClient::new("not a url", "neo4j", "neo4j", ""),
            Err(GraphError::Url(_))
        ));
    }
}
