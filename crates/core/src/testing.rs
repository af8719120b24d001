//! Fakes for the trait seams, shared by the unit tests.

use crate::traits::{CypherExecutor, LanguageModel, Row};
use crate::{GraphError, LlmError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&str, &Value) -> Vec<Row> + Send + Sync>;

/// Records every statement and answers from a closure.
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<(String, Value)>>,
    responder: Responder,
}

impl RecordingExecutor {
    pub fn new(responder: impl Fn(&str, &Value) -> Vec<Row> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn empty() -> Self {
        Self::new(|_, _| Vec::new())
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(statement, _)| statement.clone())
            .collect()
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(_, parameters)| parameters.clone())
            .collect()
    }
}

#[async_trait]
impl CypherExecutor for RecordingExecutor {
    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Row>, GraphError> {
        let rows = (self.responder)(statement, &parameters);
        self.calls
            .lock()
            .expect("calls lock")
            .push((statement.to_string(), parameters));
        Ok(rows)
    }
}

/// Fails every statement containing `needle`.
pub struct FailingExecutor {
    pub needle: &'static str,
    pub inner: RecordingExecutor,
}

#[async_trait]
impl CypherExecutor for FailingExecutor {
    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Row>, GraphError> {
        if statement.contains(self.needle) {
            return Err(GraphError::Request(format!("refused: {}", self.needle)));
        }
        self.inner.run(statement, parameters).await
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {other}"),
    }
}

/// Replies with a fixed text and keeps the prompts it was given.
pub struct ScriptedModel {
    pub reply: Result<String, ()>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> String {
        self.prompts
            .lock()
            .expect("prompts lock")
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_string());
        self.reply.clone().map_err(|_| LlmError::Empty)
    }
}
