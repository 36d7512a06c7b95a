use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One emitted unit of assistant output.
///
/// Text fragments are appendable: consecutive text at the same output index is
/// concatenated. Image and structured fragments are atomic and always replace
/// whatever occupied their slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    Text {
        content: String,
    },
    Image {
        url: Option<String>,
    },
    Structured {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        payload: Option<Value>,
    },
}

impl Fragment {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            url: Some(url.into()),
        }
    }

    /// Image slot whose content is not known yet.
    pub fn image_pending() -> Self {
        Self::Image { url: None }
    }

    pub fn structured(title: impl Into<String>, payload: Option<Value>) -> Self {
        Self::Structured {
            title: title.into(),
            detail: None,
            payload,
        }
    }

    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        match self {
            Self::Structured { title, payload, .. } => Self::Structured {
                title,
                detail: Some(detail.into()),
                payload,
            },
            other => other,
        }
    }

    /// Structured fragment carrying an error marker in its payload.
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self::Structured {
            title: "Error".to_string(),
            detail: Some(message.into()),
            payload: Some(json!({ "type": "error", "kind": kind })),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub fn is_error(&self) -> bool {
        match self {
            Self::Structured {
                payload: Some(payload),
                ..
            } => payload.get("type").and_then(Value::as_str) == Some("error"),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }

    /// Flatten to the text used when the fragment becomes conversation context.
    pub fn context_text(&self) -> &str {
        match self {
            Self::Text { content } => content,
            Self::Structured { title, .. } => title,
            Self::Image { .. } => "",
        }
    }
}

impl Default for Fragment {
    fn default() -> Self {
        Self::text("")
    }
}

impl From<String> for Fragment {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<&str> for Fragment {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}
