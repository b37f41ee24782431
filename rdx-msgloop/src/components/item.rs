//! The unit stored in the delay queue.

use crate::common::{ItemKind, Seq};
use crate::components::payload::Message;
use std::cmp::Ordering;
use std::fmt;

/// A deferred closure posted as a task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// What a work item carries. Exactly one alternative is ever populated.
pub enum Work {
    Task(Task),
    Message(Message),
}

impl Work {
    pub fn kind(&self) -> ItemKind {
        match self {
            Work::Task(_) => ItemKind::Task,
            Work::Message(_) => ItemKind::Message,
        }
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Work::Task(_) => f.write_str("Task(..)"),
            Work::Message(msg) => f.debug_tuple("Message").field(msg).finish(),
        }
    }
}

/// A scheduled unit of work: a due time plus a task or a message.
///
/// Ordered so that a `BinaryHeap<WorkItem>` yields the earliest due time
/// first, and among equal due times the lowest insertion sequence.
#[derive(Debug)]
pub struct WorkItem {
    due_ms: u64,
    pub(crate) seq: Seq,
    work: Work,
}

impl WorkItem {
    pub fn task(due_ms: u64, task: impl FnOnce() + Send + 'static) -> Self {
        Self::new(due_ms, Work::Task(Box::new(task)))
    }

    pub fn message(due_ms: u64, message: Message) -> Self {
        Self::new(due_ms, Work::Message(message))
    }

    pub fn new(due_ms: u64, work: Work) -> Self {
        Self {
            due_ms,
            seq: Seq(0),
            work,
        }
    }

    /// Monotonic milliseconds at which the item becomes eligible for dispatch.
    pub fn due_ms(&self) -> u64 {
        self.due_ms
    }

    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn kind(&self) -> ItemKind {
        self.work.kind()
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.due_ms <= now_ms
    }

    pub fn into_work(self) -> Work {
        self.work
    }

    fn key(&self) -> (u64, Seq) {
        (self.due_ms, self.seq)
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    // Reversed: the max-heap must surface the smallest key.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}
