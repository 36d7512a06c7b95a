//! portal-llm - completion providers for portal tasks
//!
//! - `decoder` - line-delimited chunk decoding over raw byte streams
//! - `openai_compat` - chat-completions request bodies and chunk shapes
//! - `provider` - the `CompletionProvider` trait and the streamed completion generator
//! - `openai` - HTTP provider for OpenAI-compatible endpoints

pub mod decoder;
pub mod error;
pub mod openai;
pub mod openai_compat;
pub mod provider;

pub use decoder::{ChunkDecoder, DecodedEvent};
pub use error::{LLMError, Result};
pub use openai::OpenAiCompatProvider;
pub use provider::{Completion, CompletionOptions, CompletionProvider, CompletionStream};
