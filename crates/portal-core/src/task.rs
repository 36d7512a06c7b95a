use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, TaskResult};
use crate::fragment::Fragment;
use crate::message::Message;

/// One pull from a [`FragmentGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedFragment {
    pub fragment: Fragment,
    pub done: bool,
    /// Output slot relative to the index the task opened at.
    pub relative_index: usize,
    /// The fragment already holds the full slot content; never append it.
    pub replace: bool,
}

impl GeneratedFragment {
    pub fn new(fragment: Fragment, relative_index: usize) -> Self {
        Self {
            fragment,
            done: false,
            relative_index,
            replace: false,
        }
    }

    pub fn last(fragment: Fragment, relative_index: usize) -> Self {
        Self {
            done: true,
            ..Self::new(fragment, relative_index)
        }
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }
}

/// Stateful pull source of fragments, consumed by exactly one sequencer.
#[async_trait]
pub trait FragmentGenerator: Send {
    async fn next_fragment(&mut self) -> TaskResult<GeneratedFragment>;
}

/// Generator replaying a fixed script. Once the script is exhausted it keeps
/// reporting an empty, finished text fragment.
pub struct ScriptedGenerator {
    steps: VecDeque<TaskResult<GeneratedFragment>>,
}

impl ScriptedGenerator {
    pub fn new(steps: impl IntoIterator<Item = TaskResult<GeneratedFragment>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Text deltas at relative index 0, the last one finishing the stream.
    pub fn text_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<_> = deltas
            .into_iter()
            .map(|delta| Ok(GeneratedFragment::new(Fragment::text(delta), 0)))
            .collect();
        if let Some(Ok(last)) = steps.last_mut() {
            last.done = true;
        }
        Self::new(steps)
    }
}

#[async_trait]
impl FragmentGenerator for ScriptedGenerator {
    async fn next_fragment(&mut self) -> TaskResult<GeneratedFragment> {
        self.steps
            .pop_front()
            .unwrap_or_else(|| Ok(GeneratedFragment::last(Fragment::text(""), 0)))
    }
}

/// What a task's `run` produced.
pub enum TaskOutcome {
    Single(Fragment),
    Batch(Vec<Fragment>),
    Streamed(Box<dyn FragmentGenerator>),
}

impl TaskOutcome {
    pub fn streamed(generator: impl FragmentGenerator + 'static) -> Self {
        Self::Streamed(Box::new(generator))
    }
}

impl fmt::Debug for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Single(fragment) => f.debug_tuple("Single").field(fragment).finish(),
            TaskOutcome::Batch(fragments) => f.debug_tuple("Batch").field(fragments).finish(),
            TaskOutcome::Streamed(_) => f.write_str("Streamed(..)"),
        }
    }
}

impl From<Fragment> for TaskOutcome {
    fn from(fragment: Fragment) -> Self {
        Self::Single(fragment)
    }
}

impl From<Vec<Fragment>> for TaskOutcome {
    fn from(fragments: Vec<Fragment>) -> Self {
        Self::Batch(fragments)
    }
}

/// Handle for appending tasks to a running sequence. Spawned tasks run after
/// every task already queued, in spawn order.
#[derive(Clone)]
pub struct TaskSpawner {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskSpawner {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn(&self, task: Task) {
        let name = task.name.clone();
        if self.tx.send(task).is_err() {
            log::warn!("Dropping task '{}': sequence already finished", name);
        }
    }
}

impl fmt::Debug for TaskSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpawner").finish_non_exhaustive()
    }
}

/// Everything a task sees when it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Request turns, plus a trailing assistant turn holding the output of
    /// earlier tasks when there is any.
    pub turns: Vec<Message>,
    pub spawner: TaskSpawner,
    pub cancel: CancellationToken,
    pub stream: bool,
}

/// Immutable view handed to a finalizer on every step of its task.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeInput<'a> {
    /// The fragment produced by this step, before accumulation.
    pub fragment: &'a Fragment,
    pub is_stream_end: bool,
    /// Accumulated content of the slot this step wrote to.
    pub accumulated: &'a Fragment,
    /// Accumulated content of every slot the task has written so far.
    pub task_content: &'a [Fragment],
    pub spawner: &'a TaskSpawner,
}

pub type Finalizer = Box<dyn for<'a> FnMut(FinalizeInput<'a>) -> Fragment + Send>;

pub(crate) type RunFn = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, TaskResult<TaskOutcome>> + Send>;

/// A unit of orchestrated work.
pub struct Task {
    pub(crate) name: String,
    pub(crate) immediate: Option<Fragment>,
    pub(crate) run: RunFn,
    pub(crate) finalizer: Option<Finalizer>,
}

impl Task {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<TaskOutcome>> + Send + 'static,
    {
        Self {
            name: name.into(),
            immediate: None,
            run: Box::new(move |ctx| Box::pin(run(ctx))),
            finalizer: None,
        }
    }

    /// Task that yields an already-known outcome.
    pub fn ready(name: impl Into<String>, outcome: TaskOutcome) -> Self {
        Self::new(name, move |_ctx| async move { Ok(outcome) })
    }

    /// Task that fails with `error` when run.
    pub fn failing(name: impl Into<String>, error: TaskError) -> Self {
        Self::new(name, move |_ctx| async move { Err(error) })
    }

    /// Provisional fragment shown before `run` is invoked. Real output
    /// replaces it in place.
    pub fn with_immediate(mut self, fragment: Fragment) -> Self {
        self.immediate = Some(fragment);
        self
    }

    pub fn with_finalizer<F>(mut self, finalizer: F) -> Self
    where
        F: for<'a> FnMut(FinalizeInput<'a>) -> Fragment + Send + 'static,
    {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("immediate", &self.immediate)
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_text_deltas_finish_on_last() {
        let mut generator = ScriptedGenerator::text_deltas(["He", "llo"]);
        let first = generator.next_fragment().await.unwrap();
        assert_eq!(first.fragment, Fragment::text("He"));
        assert!(!first.done);
        let second = generator.next_fragment().await.unwrap();
        assert!(second.done);
        let after = generator.next_fragment().await.unwrap();
        assert!(after.done);
        assert_eq!(after.fragment, Fragment::text(""));
    }

    #[test]
    fn spawn_after_receiver_dropped_is_ignored() {
        let (spawner, rx) = TaskSpawner::channel();
        drop(rx);
        spawner.spawn(Task::ready("late", Fragment::text("x").into()));
    }

    #[test]
    fn builder_sets_immediate_and_finalizer() {
        let task = Task::ready("t", TaskOutcome::Batch(vec![]))
            .with_immediate(Fragment::structured("Working", None))
            .with_finalizer(|input| input.accumulated.clone());
        assert_eq!(task.name(), "t");
        assert!(task.immediate.is_some());
        assert!(task.finalizer.is_some());
    }
}
