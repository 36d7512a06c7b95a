use async_trait::async_trait;
use portal_core::{render_transcript, Message, TaskContext, TaskOutcome, TaskResult};
use serde_json::{json, Value};

use super::{artifact_generation, title_or, Artifact, ExecutorBackend};
use crate::classifier::TaskSpec;
use crate::extract::{after_thinking, parse_json_result, parse_tag_result};
use crate::registry::{kinds, TaskExecutor};

pub const GENERATING_DOCUMENT: &str = "Generating document";
pub const DEFAULT_DOCUMENT_TITLE: &str = "document.docx";

/// Writes a markdown document, with optional style overrides, from the
/// conversation.
pub struct DocumentExecutor {
    backend: ExecutorBackend,
}

impl DocumentExecutor {
    pub fn new(backend: ExecutorBackend) -> Self {
        Self { backend }
    }
}

fn document_prompt(spec: &TaskSpec, turns: &[Message]) -> String {
    format!(
        r#"# Document generation

- Write the document the user asks for, based on the conversation and the request below.
- Output the content as markdown inside <DOCUMENT></DOCUMENT> tags.
- Output a title for the document inside <DOCUMENT_TITLE></DOCUMENT_TITLE> tags.
- Reuse information from the conversation in the <CHAT></CHAT> tags where you can.
- If the user wants the layout changed, output the adjusted style as JSON inside <DOCUMENT_STYLE></DOCUMENT_STYLE> tags.

## CHAT

<CHAT>
{}
</CHAT>

## Requirements for the document

{}
"#,
        render_transcript(turns),
        spec.task_description
    )
}

fn build_document(raw: &str) -> Artifact {
    let body = after_thinking(raw);
    let style = parse_tag_result(body, "DOCUMENT_STYLE").and_then(parse_json_result::<Value>);
    Artifact {
        title: title_or(parse_tag_result(body, "DOCUMENT_TITLE"), DEFAULT_DOCUMENT_TITLE),
        payload: json!({
            "type": "Document",
            "markdown": parse_tag_result(body, "DOCUMENT"),
            "style": style,
        }),
    }
}

#[async_trait]
impl TaskExecutor for DocumentExecutor {
    fn kind(&self) -> &str {
        kinds::DOCUMENT
    }

    async fn execute(&self, spec: &TaskSpec, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let prompt = document_prompt(spec, &ctx.turns);
        Ok(artifact_generation(
            &self.backend,
            &ctx,
            "document-body",
            prompt,
            GENERATING_DOCUMENT,
            build_document,
        ))
    }
}
