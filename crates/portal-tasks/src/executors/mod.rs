//! Executors for classified tasks.
//!
//! Document and sheet generation run as a nested sequence: a provisional
//! "generating" fragment occupies the slot while the model streams, and the
//! finalizer turns the finished reply into a structured artifact.

mod chat;
mod document;
mod search;
mod sheet;

use std::sync::Arc;

use portal_core::{
    FinalizeInput, Fragment, Message, Sequencer, Task, TaskContext, TaskError, TaskOutcome,
};
use portal_llm::{CompletionOptions, CompletionProvider};
use serde_json::Value;

pub use chat::ChatExecutor;
pub use document::DocumentExecutor;
pub use search::SearchExecutor;
pub use sheet::SheetExecutor;

/// Provider and model shared by the LLM-backed executors.
#[derive(Clone)]
pub struct ExecutorBackend {
    pub provider: Arc<dyn CompletionProvider>,
    pub model: Option<String>,
}

impl ExecutorBackend {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub(crate) fn options(&self, ctx: &TaskContext) -> CompletionOptions {
        CompletionOptions {
            stream: ctx.stream,
            model: self.model.clone(),
            cancel: ctx.cancel.clone(),
        }
    }
}

/// A finished artifact: display title plus the payload the client renders.
pub(crate) struct Artifact {
    pub title: String,
    pub payload: Value,
}

/// Nested sequence generating one artifact from a single prompt.
pub(crate) fn artifact_generation(
    backend: &ExecutorBackend,
    ctx: &TaskContext,
    name: &str,
    prompt: String,
    placeholder: &'static str,
    build: fn(&str) -> Artifact,
) -> TaskOutcome {
    let provider = Arc::clone(&backend.provider);
    let model = backend.model.clone();

    let generate = Task::new(name, move |inner: TaskContext| async move {
        let options = CompletionOptions {
            stream: inner.stream,
            model,
            cancel: inner.cancel.clone(),
        };
        let completion = provider
            .complete(&inner.turns, &options)
            .await
            .map_err(TaskError::from)?;
        Ok::<TaskOutcome, TaskError>(completion.into())
    })
    .with_immediate(Fragment::structured(placeholder, None))
    .with_finalizer(move |input: FinalizeInput<'_>| {
        let raw = input.accumulated.as_text().unwrap_or_default();
        if !input.is_stream_end {
            return Fragment::structured(placeholder, None).with_detail(raw);
        }
        let artifact = build(raw);
        Fragment::structured(artifact.title, Some(artifact.payload)).with_detail(raw)
    });

    let nested = Sequencer::new(vec![Message::user(prompt)])
        .with_stream(ctx.stream)
        .with_cancellation(ctx.cancel.clone())
        .with_task(generate);
    TaskOutcome::streamed(nested)
}

/// Non-empty trimmed section, or `fallback`.
pub(crate) fn title_or(section: Option<&str>, fallback: &str) -> String {
    section
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
