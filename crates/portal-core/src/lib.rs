//! portal-core - streaming task orchestration
//!
//! - `fragment` - Fragment, the unit of assistant output
//! - `message` - conversation turns handed to tasks
//! - `task` - Task, TaskOutcome, FragmentGenerator and finalizers
//! - `buffer` - per-index accumulation of assistant output
//! - `multiplexer` - outcome normalization and append/replace decisions
//! - `sequencer` - the pull-based state machine driving a task list

pub mod buffer;
pub mod error;
pub mod fragment;
pub mod message;
mod multiplexer;
pub mod sequencer;
pub mod task;

pub use buffer::AccumulationBuffer;
pub use error::{TaskError, TaskResult};
pub use fragment::Fragment;
pub use message::{render_transcript, Message, MessageContent, Role};
pub use sequencer::{Output, Sequencer, SequencerState};
pub use task::{
    FinalizeInput, Finalizer, FragmentGenerator, GeneratedFragment, ScriptedGenerator, Task,
    TaskContext, TaskOutcome, TaskSpawner,
};
pub use tokio_util::sync::CancellationToken;
