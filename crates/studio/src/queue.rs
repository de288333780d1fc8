use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::task::ImageTask;

struct QueuedTask {
    priority: i32,
    sequence: u64,
    task: ImageTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Reversed: the max-heap pops the lowest priority value, then the oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Pending image tasks ordered by ascending priority, FIFO within a priority.
///
/// The insertion counter restarts at zero every time the queue drains, so it
/// stays bounded over a long session.
#[derive(Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    next_sequence: u64,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the insertion sequence assigned to `task`.
    pub(crate) fn push(&mut self, task: ImageTask) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedTask {
            priority: task.priority(),
            sequence,
            task,
        });
        sequence
    }

    pub(crate) fn pop(&mut self) -> Option<ImageTask> {
        let queued = self.heap.pop()?;
        if self.heap.is_empty() {
            self.next_sequence = 0;
        }
        Some(queued.task)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
