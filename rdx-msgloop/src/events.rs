//! Defines the lifecycle events broadcast by a running loop.
//!
//! Subscribers obtain a receiver through `LoopHandle::subscribe_events`. The
//! loop never waits on subscribers: with nobody listening, events are dropped.

use crate::common::ItemKind;

/// Events related to the lifecycle of a `MessageLoop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Fired once per `run`, after `on_start` and before the first dispatch.
    Started { name: String },
    /// Fired once per `run`, after `on_stop`, just before `run` returns.
    Stopped {
        name: String,
        /// Pending items dropped by the close that ended this run.
        discarded: usize,
    },
    /// Fired when a task, the message handler, or a lifecycle hook panicked.
    /// The loop keeps dispatching.
    HandlerPanicked {
        name: String,
        /// The kind of item being dispatched, or `None` for a lifecycle hook.
        kind: Option<ItemKind>,
        reason: String,
    },
}
