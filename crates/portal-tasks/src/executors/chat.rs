use async_trait::async_trait;
use portal_core::{TaskContext, TaskOutcome, TaskResult};

use super::ExecutorBackend;
use crate::classifier::TaskSpec;
use crate::registry::TaskExecutor;

pub const CHAT_KIND: &str = "chat";

/// Plain completion over the conversation, used when classification fails.
pub struct ChatExecutor {
    backend: ExecutorBackend,
}

impl ChatExecutor {
    pub fn new(backend: ExecutorBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TaskExecutor for ChatExecutor {
    fn kind(&self) -> &str {
        CHAT_KIND
    }

    async fn execute(&self, _spec: &TaskSpec, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let completion = self
            .backend
            .provider
            .complete(&ctx.turns, &self.backend.options(&ctx))
            .await?;
        Ok(completion.into())
    }
}
