use async_trait::async_trait;
use portal_core::{render_transcript, Message, TaskContext, TaskOutcome, TaskResult};
use serde_json::json;

use super::{artifact_generation, title_or, Artifact, ExecutorBackend};
use crate::classifier::TaskSpec;
use crate::extract::{after_thinking, parse_tag_result};
use crate::registry::{kinds, TaskExecutor};

pub const GENERATING_SHEET: &str = "Generating sheet";
pub const DEFAULT_SHEET_TITLE: &str = "sheet.xlsx";

/// Arranges conversation data into a CSV sheet.
pub struct SheetExecutor {
    backend: ExecutorBackend,
}

impl SheetExecutor {
    pub fn new(backend: ExecutorBackend) -> Self {
        Self { backend }
    }
}

fn sheet_prompt(spec: &TaskSpec, turns: &[Message]) -> String {
    format!(
        r#"# Sheet generation

- Organise the data the user needs into CSV, based on the conversation and the request below, and output it inside <SHEET></SHEET> tags.
- Output a title for the sheet inside <SHEET_TITLE></SHEET_TITLE> tags.
- Spreadsheet functions such as SUM, AVERAGE, MAX and MIN may be used in cells.
- Reuse information from the conversation in the <CHAT></CHAT> tags where you can.

## CHAT

<CHAT>
{}
</CHAT>

## Requirements for the sheet

{}
"#,
        render_transcript(turns),
        spec.task_description
    )
}

fn build_sheet(raw: &str) -> Artifact {
    let body = after_thinking(raw);
    Artifact {
        title: title_or(parse_tag_result(body, "SHEET_TITLE"), DEFAULT_SHEET_TITLE),
        payload: json!({
            "type": "Sheet",
            "csv": parse_tag_result(body, "SHEET"),
        }),
    }
}

#[async_trait]
impl TaskExecutor for SheetExecutor {
    fn kind(&self) -> &str {
        kinds::SHEET
    }

    async fn execute(&self, spec: &TaskSpec, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let prompt = sheet_prompt(spec, &ctx.turns);
        Ok(artifact_generation(
            &self.backend,
            &ctx,
            "sheet-body",
            prompt,
            GENERATING_SHEET,
            build_sheet,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run_executor, StaticProvider};
    use portal_core::Fragment;
    use std::sync::Arc;

    #[test]
    fn builds_sheet_from_tagged_reply() {
        let artifact =
            build_sheet("<SHEET_TITLE> Sales </SHEET_TITLE><SHEET>q,total\nQ1,=SUM(1,2)</SHEET>");
        assert_eq!(artifact.title, "Sales");
        assert_eq!(artifact.payload, json!({"type": "Sheet", "csv": "q,total\nQ1,=SUM(1,2)"}));
    }

    #[test]
    fn empty_title_falls_back() {
        let artifact = build_sheet("<SHEET_TITLE>  </SHEET_TITLE>");
        assert_eq!(artifact.title, DEFAULT_SHEET_TITLE);
        assert!(artifact.payload["csv"].is_null());
    }

    #[tokio::test]
    async fn prompt_includes_request_and_conversation() {
        let provider = Arc::new(StaticProvider::new("<SHEET>a,b</SHEET>"));
        let executor = SheetExecutor::new(ExecutorBackend::new(provider.clone()));
        let outputs = run_executor(
            executor,
            TaskSpec::new(kinds::SHEET, "columns a and b"),
            vec![Message::user("I need a table")],
            true,
        )
        .await;

        let last = &outputs.last().unwrap().fragment;
        assert!(matches!(last, Fragment::Structured { title, .. } if title == DEFAULT_SHEET_TITLE));
        let prompt = &provider.calls()[0].prompt;
        assert!(prompt.contains("user: I need a table"));
        assert!(prompt.contains("columns a and b"));
    }
}
