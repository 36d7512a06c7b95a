use serde_json::Value;
use thiserror::Error;

use crate::fragment::Fragment;

/// Failure of a single task. Never fatal to the orchestration: the sequencer
/// turns it into an error fragment and moves on.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Provider error: {message}")]
    Provider {
        message: String,
        payload: Option<Value>,
    },

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Task failed: {0}")]
    Failed(String),
}

impl TaskError {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Transport(_) => "transport",
            TaskError::Decode(_) => "decode",
            TaskError::Provider { .. } => "provider",
            TaskError::Classification(_) => "classification",
            TaskError::Cancelled => "cancelled",
            TaskError::Failed(_) => "failed",
        }
    }

    /// Error fragment reported to the caller in place of the task's output.
    pub fn to_fragment(&self) -> Fragment {
        let fragment = Fragment::error(self.kind(), self.to_string());
        match (self, fragment) {
            (
                TaskError::Provider {
                    payload: Some(diagnostic),
                    ..
                },
                Fragment::Structured {
                    title,
                    detail,
                    payload: Some(mut marker),
                },
            ) => {
                marker["diagnostic"] = diagnostic.clone();
                Fragment::Structured {
                    title,
                    detail,
                    payload: Some(marker),
                }
            }
            (_, fragment) => fragment,
        }
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
