//! Pull-based orchestration of an ordered, growable task list.
//!
//! A [`Sequencer`] is driven by repeated calls to [`Sequencer::produce_next`].
//! Each call performs at most one unit of underlying work (starting a task,
//! invoking its `run`, one generator pull or one batch element) and reports
//! the full current content of the output slot it touched.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::buffer::AccumulationBuffer;
use crate::error::{TaskError, TaskResult};
use crate::fragment::Fragment;
use crate::message::Message;
use crate::multiplexer::{Multiplexer, Step};
use crate::task::{
    FinalizeInput, Finalizer, FragmentGenerator, GeneratedFragment, RunFn, Task, TaskContext,
    TaskSpawner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Running,
    Finished,
}

/// One pull result. `fragment` is the complete content of slot `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub fragment: Fragment,
    pub index: usize,
    pub done: bool,
}

struct ActiveTask {
    name: String,
    start: usize,
    run: Option<RunFn>,
    multiplexer: Option<Multiplexer>,
    finalizer: Option<Finalizer>,
    provisional: bool,
    /// Highest index this task has written, immediate fragment included.
    high: Option<usize>,
}

pub struct Sequencer {
    id: String,
    turns: Vec<Message>,
    stream: bool,
    queue: VecDeque<Task>,
    incoming: mpsc::UnboundedReceiver<Task>,
    spawner: TaskSpawner,
    cancel: CancellationToken,
    state: SequencerState,
    active: Option<ActiveTask>,
    buffer: AccumulationBuffer,
    next_index: usize,
    last_fragment: Fragment,
    last_index: usize,
}

impl Sequencer {
    pub fn new(turns: Vec<Message>) -> Self {
        let (spawner, incoming) = TaskSpawner::channel();
        Self {
            id: Uuid::new_v4().to_string(),
            turns,
            stream: true,
            queue: VecDeque::new(),
            incoming,
            spawner,
            cancel: CancellationToken::new(),
            state: SequencerState::Idle,
            active: None,
            buffer: AccumulationBuffer::new(),
            next_index: 0,
            last_fragment: Fragment::default(),
            last_index: 0,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Tie this orchestration to an external cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn add_task(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.add_task(task);
        self
    }

    pub fn spawner(&self) -> TaskSpawner {
        self.spawner.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn buffer(&self) -> &AccumulationBuffer {
        &self.buffer
    }

    /// Produce the next output. After `done` has been reported every further
    /// call returns the same terminal output without touching the buffer.
    pub async fn produce_next(&mut self) -> Output {
        loop {
            if self.state != SequencerState::Finished && self.cancel.is_cancelled() {
                return self.finish("cancelled");
            }

            match self.state {
                SequencerState::Finished => return self.terminal(),
                SequencerState::Idle => {
                    self.collect_spawned();
                    let Some(task) = self.queue.pop_front() else {
                        return self.finish("task list exhausted");
                    };
                    if let Some(output) = self.start(task) {
                        return output;
                    }
                }
                SequencerState::Running => {
                    if let Some(output) = self.advance().await {
                        return output;
                    }
                }
            }
        }
    }

    fn collect_spawned(&mut self) {
        while let Ok(task) = self.incoming.try_recv() {
            log::debug!("[{}] Task '{}' appended to sequence", self.id, task.name);
            self.queue.push_back(task);
        }
    }

    fn start(&mut self, task: Task) -> Option<Output> {
        let start = self.next_index;
        log::debug!("[{}] Task '{}' opens at index {}", self.id, task.name, start);

        let mut active = ActiveTask {
            name: task.name,
            start,
            run: Some(task.run),
            multiplexer: None,
            finalizer: task.finalizer,
            provisional: false,
            high: None,
        };
        self.state = SequencerState::Running;

        let output = task.immediate.map(|fragment| {
            self.buffer.set(start, fragment.clone());
            active.provisional = true;
            active.high = Some(start);
            self.record(fragment, start, false)
        });
        self.active = Some(active);
        output
    }

    fn task_context(&self, start: usize) -> TaskContext {
        let mut turns = self.turns.clone();
        turns.extend(self.buffer.as_assistant_turn(start));
        TaskContext {
            turns,
            spawner: self.spawner.clone(),
            cancel: self.cancel.child_token(),
            stream: self.stream,
        }
    }

    async fn advance(&mut self) -> Option<Output> {
        let Some(mut active) = self.active.take() else {
            self.state = SequencerState::Idle;
            return None;
        };

        let cancel = self.cancel.clone();

        if let Some(run) = active.run.take() {
            let ctx = self.task_context(active.start);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = run(ctx) => Some(result),
            };
            let Some(result) = result else {
                return Some(self.finish("cancelled during run"));
            };
            match result {
                Ok(outcome) => {
                    log::debug!("[{}] Task '{}' returned {:?}", self.id, active.name, outcome);
                    active.multiplexer = Some(Multiplexer::new(outcome, active.provisional));
                    self.active = Some(active);
                    return None;
                }
                Err(error) => return Some(self.fail(active, error)),
            }
        }

        let Some(multiplexer) = active.multiplexer.as_mut() else {
            return self.end_silently(active);
        };
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            step = multiplexer.next_step() => Some(step),
        };
        let Some(step) = step else {
            return Some(self.finish("cancelled mid-stream"));
        };

        match step {
            Ok(Some(step)) => Some(self.emit(active, step)),
            Ok(None) if active.provisional => {
                let placeholder = self.buffer.get(active.start).cloned().unwrap_or_default();
                let step = Step {
                    fragment: placeholder,
                    relative_index: 0,
                    replace: true,
                    is_stream_end: true,
                };
                Some(self.emit(active, step))
            }
            Ok(None) => self.end_silently(active),
            Err(TaskError::Cancelled) if self.cancel.is_cancelled() => {
                Some(self.finish("cancelled by task"))
            }
            Err(error) => Some(self.fail(active, error)),
        }
    }

    fn emit(&mut self, mut active: ActiveTask, step: Step) -> Output {
        let raw = step.fragment.clone();
        let is_stream_end = step.is_stream_end;
        let index = match active.multiplexer.as_mut() {
            Some(multiplexer) => multiplexer.write(step, active.start, &mut self.buffer),
            None => {
                self.buffer.set(active.start, step.fragment);
                active.start
            }
        };
        active.provisional = false;
        let high = active.high.map_or(index, |high| high.max(index));
        active.high = Some(high);

        let accumulated = self.buffer.get(index).cloned().unwrap_or_default();
        let fragment = match active.finalizer.as_mut() {
            Some(finalizer) => finalizer(FinalizeInput {
                fragment: &raw,
                is_stream_end,
                accumulated: &accumulated,
                task_content: self.buffer.range(active.start, high),
                spawner: &self.spawner,
            }),
            None => accumulated,
        };

        if !is_stream_end {
            self.active = Some(active);
            return self.record(fragment, index, false);
        }

        self.buffer.set(index, fragment.clone());
        let done = self.close(&active.name, high + 1);
        self.record(fragment, index, done)
    }

    fn fail(&mut self, active: ActiveTask, error: TaskError) -> Output {
        log::warn!("[{}] Task '{}' failed: {}", self.id, active.name, error);

        let wrote_output = active
            .multiplexer
            .as_ref()
            .is_some_and(Multiplexer::has_emitted);
        let index = match active.high {
            Some(high) if wrote_output => high + 1,
            _ => active.start,
        };
        let fragment = error.to_fragment();
        self.buffer.set(index, fragment.clone());
        let done = self.close(&active.name, index + 1);
        self.record(fragment, index, done)
    }

    /// The task ended without writing anything: no index is consumed.
    fn end_silently(&mut self, active: ActiveTask) -> Option<Output> {
        log::debug!("[{}] Task '{}' produced no output", self.id, active.name);
        self.state = SequencerState::Idle;
        None
    }

    /// Finish the active task; returns whether the whole sequence is done.
    fn close(&mut self, name: &str, next_index: usize) -> bool {
        log::debug!(
            "[{}] Task '{}' finished, next index {}",
            self.id,
            name,
            next_index
        );
        self.next_index = next_index;
        self.collect_spawned();
        if self.queue.is_empty() {
            self.state = SequencerState::Finished;
            true
        } else {
            self.state = SequencerState::Idle;
            false
        }
    }

    fn finish(&mut self, reason: &str) -> Output {
        if self.state != SequencerState::Finished {
            log::debug!("[{}] Sequence finished: {}", self.id, reason);
        }
        self.state = SequencerState::Finished;
        self.active = None;
        self.terminal()
    }

    fn terminal(&self) -> Output {
        Output {
            fragment: self.last_fragment.clone(),
            index: self.last_index,
            done: true,
        }
    }

    fn record(&mut self, fragment: Fragment, index: usize, done: bool) -> Output {
        self.last_fragment = fragment.clone();
        self.last_index = index;
        Output {
            fragment,
            index,
            done,
        }
    }
}

/// A sequence can itself be a task's output. Its outputs already hold full
/// slot content, so they replace rather than append in the parent.
#[async_trait]
impl FragmentGenerator for Sequencer {
    async fn next_fragment(&mut self) -> TaskResult<GeneratedFragment> {
        let output = self.produce_next().await;
        Ok(GeneratedFragment {
            fragment: output.fragment,
            done: output.done,
            relative_index: output.index,
            replace: true,
        })
    }
}
