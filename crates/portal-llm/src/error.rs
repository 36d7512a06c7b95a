use portal_core::TaskError;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("API error: HTTP {status}: {message}")]
    Provider {
        status: u16,
        message: String,
        payload: Option<Value>,
    },

    #[error("Cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, LLMError>;

impl LLMError {
    /// Build a provider error from a non-success response body, keeping the
    /// provider's JSON diagnostic when there is one.
    pub fn from_response(status: u16, body: &str) -> Self {
        let payload = serde_json::from_str::<Value>(body).ok();
        let message = payload
            .as_ref()
            .and_then(|value| value.pointer("/error/message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string());
        LLMError::Provider {
            status,
            message,
            payload,
        }
    }
}

impl From<LLMError> for TaskError {
    fn from(error: LLMError) -> Self {
        match error {
            LLMError::Transport(_) | LLMError::Stream(_) => TaskError::Transport(error.to_string()),
            LLMError::Json(_) | LLMError::Decode(_) => TaskError::Decode(error.to_string()),
            LLMError::Provider { ref payload, .. } => TaskError::Provider {
                payload: payload.clone(),
                message: error.to_string(),
            },
            LLMError::Cancelled => TaskError::Cancelled,
        }
    }
}
