//! Scripted provider and drivers shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use portal_core::{render_transcript, Message, Output, Sequencer, Task};
use portal_llm::{
    Completion, CompletionOptions, CompletionProvider, CompletionStream, LLMError,
};
use serde_json::json;

use crate::classifier::TaskSpec;
use crate::registry::TaskExecutor;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub stream: bool,
    pub model: Option<String>,
}

pub enum Reply {
    Text(String),
    Fail(u16, String),
}

/// Provider replaying scripted replies in order; the last one repeats.
/// Streamed replies go through the real chunk decoder in 4-character deltas.
pub struct StaticProvider {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl StaticProvider {
    pub fn new(reply: &str) -> Self {
        Self::script(vec![Reply::Text(reply.to_string())])
    }

    pub fn script(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Result<String, LLMError> {
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().map(|reply| match reply {
                Reply::Text(text) => Reply::Text(text.clone()),
                Reply::Fail(status, body) => Reply::Fail(*status, body.clone()),
            })
        };
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(status, body)) => Err(LLMError::from_response(status, &body)),
            None => Ok(String::new()),
        }
    }
}

pub fn sse_body(text: &str) -> Vec<Result<Bytes, LLMError>> {
    let chars: Vec<char> = text.chars().collect();
    let mut events: Vec<Result<Bytes, LLMError>> = chars
        .chunks(4)
        .map(|piece| {
            let delta: String = piece.iter().collect();
            let chunk = json!({"choices": [{"index": 0, "delta": {"content": delta}}]});
            Ok(Bytes::from(format!("data: {chunk}\n\n")))
        })
        .collect();
    events.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));
    events
}

#[async_trait]
impl CompletionProvider for StaticProvider {
    async fn complete(
        &self,
        turns: &[Message],
        options: &CompletionOptions,
    ) -> portal_llm::Result<Completion> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: render_transcript(turns),
            stream: options.stream,
            model: options.model.clone(),
        });

        let text = self.next_reply()?;
        if options.stream {
            Ok(Completion::Streamed(CompletionStream::new(
                stream::iter(sse_body(&text)),
                options.cancel.clone(),
            )))
        } else {
            Ok(Completion::Single(portal_core::Fragment::text(text)))
        }
    }
}

pub async fn drain(sequencer: &mut Sequencer) -> Vec<Output> {
    let mut outputs = Vec::new();
    loop {
        let output = sequencer.produce_next().await;
        let done = output.done;
        outputs.push(output);
        if done {
            return outputs;
        }
    }
}

/// Run one executor as the only task of a fresh sequence.
pub async fn run_executor<E>(
    executor: E,
    spec: TaskSpec,
    turns: Vec<Message>,
    stream: bool,
) -> Vec<Output>
where
    E: TaskExecutor + 'static,
{
    let executor = Arc::new(executor);
    let task = Task::new(spec.task_kind.clone(), move |ctx| async move {
        executor.execute(&spec, ctx).await
    });
    let mut sequencer = Sequencer::new(turns).with_stream(stream).with_task(task);
    drain(&mut sequencer).await
}
