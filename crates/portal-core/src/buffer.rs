//! Running record of what the assistant has said in one orchestration.

use crate::fragment::Fragment;
use crate::message::Message;

/// One slot per output index, in index order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulationBuffer {
    slots: Vec<Fragment>,
}

impl AccumulationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Fragment> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[Fragment] {
        &self.slots
    }

    /// Slots `start..=end`, clamped to what exists.
    pub fn range(&self, start: usize, end: usize) -> &[Fragment] {
        let end = (end + 1).min(self.slots.len());
        let start = start.min(end);
        &self.slots[start..end]
    }

    /// Overwrite the slot at `index`. Indices are dense: writing past the end
    /// fills the gap with empty text.
    pub fn set(&mut self, index: usize, fragment: Fragment) {
        if index < self.slots.len() {
            self.slots[index] = fragment;
            return;
        }
        while self.slots.len() < index {
            self.slots.push(Fragment::default());
        }
        self.slots.push(fragment);
    }

    /// Append-or-replace: text onto a text slot is concatenated, anything
    /// else replaces the slot.
    pub fn merge(&mut self, index: usize, fragment: Fragment) -> &Fragment {
        match fragment {
            Fragment::Text { content: delta } => match self.slots.get_mut(index) {
                Some(Fragment::Text { content }) => content.push_str(&delta),
                _ => self.set(index, Fragment::Text { content: delta }),
            },
            other => self.set(index, other),
        }
        &self.slots[index]
    }

    pub fn append_text(&mut self, index: usize, delta: &str) -> &Fragment {
        self.merge(index, Fragment::text(delta))
    }

    /// Synthetic assistant turn holding slots `0..upto`, or `None` when empty.
    pub fn as_assistant_turn(&self, upto: usize) -> Option<Message> {
        let upto = upto.min(self.slots.len());
        if upto == 0 {
            return None;
        }
        Some(Message::assistant_fragments(self.slots[..upto].to_vec()))
    }
}
