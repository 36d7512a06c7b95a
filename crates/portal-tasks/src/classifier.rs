use std::sync::Arc;

use async_trait::async_trait;
use portal_core::{render_transcript, Message, TaskError, TaskResult};
use portal_llm::{CompletionOptions, CompletionProvider};
use serde::{Deserialize, Serialize};

use crate::extract::parse_json_result;
use crate::registry::kinds;

/// One unit of work the classifier found in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(alias = "taskType", alias = "task_type")]
    pub task_kind: String,
    #[serde(default, alias = "taskDescription")]
    pub task_description: String,
}

impl TaskSpec {
    pub fn new(task_kind: impl Into<String>, task_description: impl Into<String>) -> Self {
        Self {
            task_kind: task_kind.into(),
            task_description: task_description.into(),
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Ordered tasks requested by the latest turn. An empty list is reported
    /// as [`TaskError::Classification`].
    async fn classify(&self, turns: &[Message]) -> TaskResult<Vec<TaskSpec>>;
}

/// Classifier backed by a non-streamed completion returning a JSON array.
pub struct LlmClassifier {
    provider: Arc<dyn CompletionProvider>,
    model: Option<String>,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

pub(crate) fn classification_prompt(turns: &[Message]) -> String {
    format!(
        r#"# Task breakdown

You are a classifier. Break the user's latest request down into the tasks we can carry out for them.

1. If several tasks match, list them one by one in order.
2. Reply with a JSON array of objects holding `taskType` and `taskDescription`, e.g. [{{ "taskType": "{search}", "taskDescription": "find material on ..." }}]

## Task types we can carry out

- {search}: information search
- {document}: document generation and editing
- {sheet}: spreadsheet generation and editing
- {slides}: presentation generation and editing
- {todo}: to-do items

## Conversation

{transcript}"#,
        search = kinds::SEARCH,
        document = kinds::DOCUMENT,
        sheet = kinds::SHEET,
        slides = kinds::SLIDES,
        todo = kinds::TODO,
        transcript = render_transcript(turns),
    )
}

pub(crate) fn parse_task_specs(reply: &str) -> TaskResult<Vec<TaskSpec>> {
    match parse_json_result::<Vec<TaskSpec>>(reply) {
        Some(specs) if !specs.is_empty() => Ok(specs),
        Some(_) => Err(TaskError::Classification("no tasks found".to_string())),
        None => Err(TaskError::Classification(format!(
            "unparseable classifier reply: {}",
            reply.trim()
        ))),
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, turns: &[Message]) -> TaskResult<Vec<TaskSpec>> {
        let prompt = vec![Message::user(classification_prompt(turns))];
        let mut options = CompletionOptions::streaming(false);
        options.model = self.model.clone();

        let reply = self
            .provider
            .complete(&prompt, &options)
            .await?
            .into_text()
            .await?;

        let specs = parse_task_specs(&reply)?;
        log::debug!(
            "Classified {} task(s): {:?}",
            specs.len(),
            specs.iter().map(|spec| spec.task_kind.as_str()).collect::<Vec<_>>()
        );
        Ok(specs)
    }
}
