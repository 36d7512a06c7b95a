use async_trait::async_trait;
use portal_core::{render_transcript, Message, TaskContext, TaskOutcome, TaskResult};

use super::ExecutorBackend;
use crate::classifier::TaskSpec;
use crate::registry::{kinds, TaskExecutor};

/// Answers a retrieval request from the model's own knowledge, streaming the
/// reply straight into the task's slot.
pub struct SearchExecutor {
    backend: ExecutorBackend,
}

impl SearchExecutor {
    pub fn new(backend: ExecutorBackend) -> Self {
        Self { backend }
    }
}

fn search_prompt(spec: &TaskSpec, turns: &[Message]) -> String {
    format!(
        r#"# Information retrieval

You are a retriever. Find the information the user describes. When no search text is given, produce the relevant information using general rules. The user's conversation is provided as well.

## Conversation

{}

## What to retrieve

{}
"#,
        render_transcript(turns),
        spec.task_description
    )
}

#[async_trait]
impl TaskExecutor for SearchExecutor {
    fn kind(&self) -> &str {
        kinds::SEARCH
    }

    async fn execute(&self, spec: &TaskSpec, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let turns = vec![Message::user(search_prompt(spec, &ctx.turns))];
        let completion = self
            .backend
            .provider
            .complete(&turns, &self.backend.options(&ctx))
            .await?;
        Ok(completion.into())
    }
}
