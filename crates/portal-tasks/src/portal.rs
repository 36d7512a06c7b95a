//! The portal conversation: classify the latest request, then run one task
//! per classified item after an analysis tip.

use std::sync::Arc;

use portal_core::{
    CancellationToken, Fragment, Message, Role, Sequencer, Task, TaskContext, TaskError,
    TaskOutcome,
};
use serde_json::json;

use crate::classifier::{Classifier, LlmClassifier, TaskSpec};
use crate::executors::{
    ChatExecutor, DocumentExecutor, ExecutorBackend, SearchExecutor, SheetExecutor,
};
use crate::registry::{executor_task, kinds, RegistryError, SharedExecutor, TaskRegistry};

pub const ANALYZING: &str = "Analyzing";
pub const ANALYSIS_COMPLETE: &str = "Analysis complete";

fn tip(title: &str) -> Fragment {
    Fragment::structured(title, Some(json!({ "type": "tips" })))
}

fn latest_user_text(turns: &[Message]) -> String {
    turns
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(Message::text_content)
        .unwrap_or_default()
}

pub struct Portal {
    classifier: Arc<dyn Classifier>,
    registry: Arc<TaskRegistry>,
    default_executor: SharedExecutor,
}

impl Portal {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        registry: Arc<TaskRegistry>,
        default_executor: SharedExecutor,
    ) -> Self {
        Self {
            classifier,
            registry,
            default_executor,
        }
    }

    /// Standard wiring: an LLM classifier, search for retrieval and for kinds
    /// without a dedicated executor, document and sheet generation on the
    /// artifact backend, and a plain chat completion when classification
    /// fails.
    pub fn from_backends(
        chat: ExecutorBackend,
        artifact: ExecutorBackend,
    ) -> Result<Self, RegistryError> {
        let mut classifier = LlmClassifier::new(Arc::clone(&chat.provider));
        if let Some(model) = &chat.model {
            classifier = classifier.with_model(model.clone());
        }

        let search: SharedExecutor = Arc::new(SearchExecutor::new(chat.clone()));
        let registry = TaskRegistry::new(Arc::clone(&search));
        registry.register_shared(Arc::clone(&search))?;
        registry.register_as(kinds::SLIDES, Arc::clone(&search))?;
        registry.register_as(kinds::TODO, search)?;
        registry.register(DocumentExecutor::new(artifact.clone()))?;
        registry.register(SheetExecutor::new(artifact))?;

        Ok(Self::new(
            Arc::new(classifier),
            Arc::new(registry),
            Arc::new(ChatExecutor::new(chat)),
        ))
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Task 0: shows an analysis tip, classifies, and appends the classified
    /// tasks to the running sequence.
    pub fn analysis_task(&self) -> Task {
        let classifier = Arc::clone(&self.classifier);
        let registry = Arc::clone(&self.registry);
        let default_executor = Arc::clone(&self.default_executor);

        Task::new("analysis", move |ctx: TaskContext| async move {
            match classifier.classify(&ctx.turns).await {
                Ok(specs) => {
                    for spec in specs {
                        ctx.spawner.spawn(registry.task_for(spec));
                    }
                }
                Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
                Err(error) => {
                    log::warn!("Classification failed, running default task: {}", error);
                    let spec = TaskSpec::new(default_executor.kind(), latest_user_text(&ctx.turns));
                    ctx.spawner.spawn(executor_task(default_executor, spec));
                }
            }
            Ok::<TaskOutcome, TaskError>(TaskOutcome::Single(tip(ANALYSIS_COMPLETE)))
        })
        .with_immediate(tip(ANALYZING))
    }

    pub fn sequence(&self, turns: Vec<Message>, stream: bool, cancel: CancellationToken) -> Sequencer {
        let sequencer = Sequencer::new(turns)
            .with_stream(stream)
            .with_cancellation(cancel)
            .with_task(self.analysis_task());
        log::debug!("[{}] Portal sequence created", sequencer.id());
        sequencer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, Reply, StaticProvider};
    use async_trait::async_trait;
    use portal_core::TaskResult;

    struct FixedClassifier(TaskResult<Vec<TaskSpec>>);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _turns: &[Message]) -> TaskResult<Vec<TaskSpec>> {
            self.0.clone()
        }
    }

    fn portal(provider: Arc<StaticProvider>) -> Portal {
        let backend = ExecutorBackend::new(provider);
        Portal::from_backends(backend.clone(), backend).unwrap()
    }

    #[test]
    fn standard_registry_kinds() {
        let portal = portal(Arc::new(StaticProvider::new("")));
        assert_eq!(
            portal.registry().kinds(),
            vec!["document", "search", "sheet", "slides", "todo"]
        );
        assert_eq!(portal.registry().resolve("slides").kind(), kinds::SEARCH);
    }

    #[tokio::test]
    async fn classified_tasks_follow_analysis() {
        let provider = Arc::new(StaticProvider::script(vec![
            Reply::Text(
                r#"[{"taskType":"search","taskDescription":"rust"},{"taskType":"todo","taskDescription":"remind me"}]"#
                    .to_string(),
            ),
            Reply::Text("first".to_string()),
            Reply::Text("second".to_string()),
        ]));
        let portal = portal(provider.clone());
        let mut sequence = portal.sequence(
            vec![Message::user("find rust news and remind me")],
            false,
            CancellationToken::new(),
        );

        let outputs = drain(&mut sequence).await;
        let shown: Vec<(usize, Fragment)> = outputs
            .iter()
            .map(|output| (output.index, output.fragment.clone()))
            .collect();
        assert_eq!(
            shown,
            vec![
                (0, tip(ANALYZING)),
                (0, tip(ANALYSIS_COMPLETE)),
                (1, Fragment::text("first")),
                (2, Fragment::text("second")),
            ]
        );
        assert!(outputs.last().unwrap().done);

        // later tasks see the analysis outcome as an assistant turn
        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[2].prompt.contains("assistant: Analysis complete\nfirst"));
    }

    #[tokio::test]
    async fn classification_failure_falls_back_to_chat() {
        let provider = Arc::new(StaticProvider::new("plain answer"));
        let backend = ExecutorBackend::new(provider.clone());
        let registry = TaskRegistry::new(Arc::new(SearchExecutor::new(backend.clone())));
        let portal = Portal::new(
            Arc::new(FixedClassifier(Err(TaskError::Classification("no tasks".into())))),
            Arc::new(registry),
            Arc::new(ChatExecutor::new(backend)),
        );

        let mut sequence = portal.sequence(vec![Message::user("hello")], true, CancellationToken::new());
        let outputs = drain(&mut sequence).await;

        let last = outputs.last().unwrap();
        assert_eq!(last.index, 1);
        assert_eq!(last.fragment, Fragment::text("plain answer"));
        assert_eq!(provider.calls()[0].prompt, "user: hello\n\nassistant: Analysis complete");
    }

    #[tokio::test]
    async fn failing_task_does_not_stop_later_tasks() {
        let provider = Arc::new(StaticProvider::script(vec![
            Reply::Fail(500, r#"{"error":{"message":"overloaded"}}"#.to_string()),
            Reply::Text("still here".to_string()),
        ]));
        let backend = ExecutorBackend::new(provider);
        let registry = TaskRegistry::new(Arc::new(SearchExecutor::new(backend.clone())));
        let portal = Portal::new(
            Arc::new(FixedClassifier(Ok(vec![
                TaskSpec::new(kinds::SEARCH, "one"),
                TaskSpec::new(kinds::SEARCH, "two"),
            ]))),
            Arc::new(registry),
            Arc::new(ChatExecutor::new(backend)),
        );

        let mut sequence = portal.sequence(vec![Message::user("two things")], false, CancellationToken::new());
        let outputs = drain(&mut sequence).await;

        assert!(outputs[2].fragment.is_error());
        assert_eq!(outputs[2].index, 1);
        assert_eq!(outputs[3].fragment, Fragment::text("still here"));
        assert_eq!(outputs[3].index, 2);
    }

    #[tokio::test]
    async fn document_task_occupies_one_slot() {
        let provider = Arc::new(StaticProvider::new(
            "<DOCUMENT_TITLE>Memo</DOCUMENT_TITLE><DOCUMENT>Hi team</DOCUMENT>",
        ));
        let backend = ExecutorBackend::new(provider);
        let registry = TaskRegistry::new(Arc::new(SearchExecutor::new(backend.clone())));
        registry.register(DocumentExecutor::new(backend.clone())).unwrap();
        let portal = Portal::new(
            Arc::new(FixedClassifier(Ok(vec![TaskSpec::new(kinds::DOCUMENT, "memo")]))),
            Arc::new(registry),
            Arc::new(ChatExecutor::new(backend)),
        );

        let mut sequence = portal.sequence(vec![Message::user("write a memo")], true, CancellationToken::new());
        let outputs = drain(&mut sequence).await;

        assert!(outputs[2..].iter().all(|output| output.index == 1));
        assert!(matches!(
            &outputs.last().unwrap().fragment,
            Fragment::Structured { title, .. } if title == "Memo"
        ));
        assert_eq!(sequence.buffer().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_portal_reports_done() {
        let portal = portal(Arc::new(StaticProvider::new("[]")));
        let cancel = CancellationToken::new();
        let mut sequence = portal.sequence(vec![Message::user("hi")], true, cancel.clone());

        let first = sequence.produce_next().await;
        assert_eq!(first.fragment, tip(ANALYZING));
        cancel.cancel();
        let next = sequence.produce_next().await;
        assert!(next.done);
        assert_eq!(next.fragment, tip(ANALYZING));
    }
}
