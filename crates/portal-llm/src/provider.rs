use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use portal_core::{
    CancellationToken, Fragment, FragmentGenerator, GeneratedFragment, Message, TaskError,
    TaskOutcome, TaskResult,
};

use crate::decoder::{ChunkDecoder, DecodedEvent};
use crate::error::{LLMError, Result};
use crate::openai_compat::{CompletionChunk, ThinkingTagger, FINISH_LENGTH};

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub stream: bool,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    pub cancel: CancellationToken,
}

impl CompletionOptions {
    pub fn streaming(stream: bool) -> Self {
        Self {
            stream,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A provider reply: either the whole text at once or a live stream.
pub enum Completion {
    Single(Fragment),
    Streamed(CompletionStream),
}

impl Completion {
    /// Drain the reply into plain text. Streamed replies are pulled to the end.
    pub async fn into_text(self) -> TaskResult<String> {
        match self {
            Completion::Single(fragment) => Ok(fragment.context_text().to_string()),
            Completion::Streamed(mut stream) => {
                let mut text = String::new();
                loop {
                    let step = stream.next_fragment().await?;
                    text.push_str(step.fragment.context_text());
                    if step.done {
                        return Ok(text);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Single(fragment) => f.debug_tuple("Single").field(fragment).finish(),
            Completion::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

impl From<Completion> for TaskOutcome {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Single(fragment) => TaskOutcome::Single(fragment),
            Completion::Streamed(stream) => TaskOutcome::streamed(stream),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a chat completion over `turns`.
    ///
    /// With `options.stream` set the reply is a [`CompletionStream`] of text
    /// deltas at relative index 0; otherwise a single text fragment.
    async fn complete(&self, turns: &[Message], options: &CompletionOptions) -> Result<Completion>;
}

/// Generator over a decoded completion stream.
///
/// Yields one text delta per non-empty chunk and a final, possibly empty,
/// fragment once the stream ends. Reasoning is wrapped in thinking markers.
pub struct CompletionStream {
    decoder: ChunkDecoder<ByteStream, CompletionChunk>,
    tagger: ThinkingTagger,
    cancel: CancellationToken,
    finished: bool,
    finish_reason: Option<String>,
}

impl CompletionStream {
    pub fn new<S, E>(bytes: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<LLMError>,
    {
        let bytes: ByteStream = bytes.map(|chunk| chunk.map_err(Into::into)).boxed();
        Self {
            decoder: ChunkDecoder::new(bytes),
            tagger: ThinkingTagger::new(),
            cancel,
            finished: false,
            finish_reason: None,
        }
    }

    /// The `finish_reason` of the last chunk that carried one.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }
}

#[async_trait]
impl FragmentGenerator for CompletionStream {
    async fn next_fragment(&mut self) -> TaskResult<GeneratedFragment> {
        loop {
            if self.finished {
                return Ok(GeneratedFragment::last(Fragment::text(""), 0));
            }

            let cancel = self.cancel.clone();
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = self.decoder.next_event() => Some(event),
            };
            let Some(event) = event else {
                self.finished = true;
                return Err(TaskError::Cancelled);
            };

            match event {
                Some(DecodedEvent::Payload(chunk)) => {
                    if let Some(reason) = chunk.finish_reason() {
                        self.finish_reason = Some(reason.to_string());
                    }
                    let text = chunk
                        .delta()
                        .map(|delta| self.tagger.push(delta))
                        .unwrap_or_default();
                    if !text.is_empty() {
                        return Ok(GeneratedFragment::new(Fragment::text(text), 0));
                    }
                }
                Some(DecodedEvent::Failed(error)) => {
                    self.finished = true;
                    return Err(error.into());
                }
                None => {
                    self.finished = true;
                    if self.finish_reason() == Some(FINISH_LENGTH) {
                        log::warn!("Completion stream stopped at the token limit");
                    }
                    let tail = self.tagger.finish().unwrap_or_default();
                    return Ok(GeneratedFragment::last(Fragment::text(tail), 0));
                }
            }
        }
    }
}
