//! Normalizes the three outcome shapes into one step-at-a-time source and
//! decides, per step, whether the slot is appended to or replaced.

use std::collections::VecDeque;

use crate::buffer::AccumulationBuffer;
use crate::error::TaskResult;
use crate::fragment::Fragment;
use crate::task::TaskOutcome;

/// One unit of task output, before finalization.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub fragment: Fragment,
    pub relative_index: usize,
    pub replace: bool,
    pub is_stream_end: bool,
}

enum Source {
    Single(Option<Fragment>),
    Batch(VecDeque<Fragment>),
    Streamed(Box<dyn crate::task::FragmentGenerator>),
}

pub(crate) struct Multiplexer {
    source: Source,
    /// Relative index of the most recent step. Never moves backwards and
    /// advances by at most one slot per step.
    position: usize,
    emitted: usize,
    /// The opening slot still holds the task's immediate fragment.
    provisional: bool,
}

impl Multiplexer {
    pub fn new(outcome: TaskOutcome, provisional: bool) -> Self {
        let source = match outcome {
            TaskOutcome::Single(fragment) => Source::Single(Some(fragment)),
            TaskOutcome::Batch(fragments) => Source::Batch(fragments.into()),
            TaskOutcome::Streamed(generator) => Source::Streamed(generator),
        };
        Self {
            source,
            position: 0,
            emitted: 0,
            provisional,
        }
    }

    /// Pull exactly one unit of work. `None` means the outcome had nothing
    /// left to give without ever signalling an end (an empty batch).
    pub async fn next_step(&mut self) -> TaskResult<Option<Step>> {
        let step = match &mut self.source {
            Source::Single(fragment) => fragment.take().map(|fragment| Step {
                fragment,
                relative_index: 0,
                replace: true,
                is_stream_end: true,
            }),
            Source::Batch(items) => match items.pop_front() {
                Some(fragment) => Some(Step {
                    fragment,
                    relative_index: self.emitted,
                    replace: true,
                    is_stream_end: items.is_empty(),
                }),
                None => None,
            },
            Source::Streamed(generator) => {
                let generated = generator.next_fragment().await?;
                let ceiling = if self.emitted == 0 {
                    0
                } else {
                    self.position.saturating_add(1)
                };
                Some(Step {
                    relative_index: generated.relative_index.clamp(self.position, ceiling),
                    fragment: generated.fragment,
                    replace: generated.replace,
                    is_stream_end: generated.done,
                })
            }
        };

        if let Some(step) = &step {
            self.position = step.relative_index;
            self.emitted += 1;
        }
        Ok(step)
    }

    /// Write a step into the buffer relative to `start`; returns the
    /// absolute index written.
    pub fn write(&mut self, step: Step, start: usize, buffer: &mut AccumulationBuffer) -> usize {
        let index = start.saturating_add(step.relative_index);
        let replace = step.replace || (self.provisional && index == start);
        if index == start {
            self.provisional = false;
        }

        if replace {
            buffer.set(index, step.fragment);
        } else {
            buffer.merge(index, step.fragment);
        }
        index
    }

    pub fn has_emitted(&self) -> bool {
        self.emitted > 0
    }
}
