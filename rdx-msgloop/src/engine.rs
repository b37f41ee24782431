//! The dispatch loop and the handle used to feed it.

use crate::common::ItemKind;
use crate::components::item::{Work, WorkItem};
use crate::components::payload::Message;
use crate::components::queue::DelayQueue;
use crate::config::LoopConfig;
use crate::error::PostError;
use crate::events::LoopEvent;
use crate::time::duration_to_millis_saturating;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, trace};

/// A lifecycle hook: `on_start`, `on_stop` or `on_loop`.
pub type Hook = Box<dyn FnMut() + Send>;
/// The `on_handle` handler messages are dispatched to.
pub type MessageHandler = Box<dyn FnMut(Message) + Send>;

/// State shared between a loop and all of its handles.
///
/// The queue's closed flag is the loop's stop state, so stopping and
/// rejecting posts always change together under the queue lock.
struct Shared {
    name: String,
    queue: DelayQueue,
    event_sender: broadcast::Sender<LoopEvent>,
}

/// A cloneable, thread-safe handle to a `MessageLoop`.
///
/// Handles post work and stop the loop from any thread, including from inside
/// a handler running on the loop thread itself. None of these operations wait
/// on the loop thread.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

impl LoopHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Schedules `task` to run on the loop thread `delay_ms` from now.
    ///
    /// Posting to a stopped loop is not an error: the task is dropped without
    /// running and the call returns immediately. Use `try_post_task` to learn
    /// whether the task was accepted.
    pub fn post_task(&self, task: impl FnOnce() + Send + 'static, delay_ms: u64) {
        if self.try_post_task(task, delay_ms).is_err() {
            debug!(loop_name = %self.shared.name, "loop stopped; task dropped");
        }
    }

    pub fn post_task_after(&self, task: impl FnOnce() + Send + 'static, delay: Duration) {
        self.post_task(task, duration_to_millis_saturating(delay));
    }

    pub fn try_post_task(
        &self,
        task: impl FnOnce() + Send + 'static,
        delay_ms: u64,
    ) -> Result<(), PostError> {
        let due_ms = self.shared.queue.clock().deadline_after(delay_ms);
        self.shared.queue.push(WorkItem::task(due_ms, task)).map(drop)
    }

    /// Schedules `message` for the `on_handle` handler `delay_ms` from now.
    ///
    /// Same drop-silently contract as `post_task`.
    pub fn post_message(&self, message: Message, delay_ms: u64) {
        if self.try_post_message(message, delay_ms).is_err() {
            debug!(loop_name = %self.shared.name, "loop stopped; message dropped");
        }
    }

    pub fn post_message_after(&self, message: Message, delay: Duration) {
        self.post_message(message, duration_to_millis_saturating(delay));
    }

    pub fn try_post_message(&self, message: Message, delay_ms: u64) -> Result<(), PostError> {
        let due_ms = self.shared.queue.clock().deadline_after(delay_ms);
        self.shared.queue.push(WorkItem::message(due_ms, message)).map(drop)
    }

    /// Asks the loop to stop and discards all pending work.
    ///
    /// Cooperative: a handler already executing runs to completion, nothing
    /// else is dispatched, and `run` returns within one poll interval.
    /// Idempotent and safe to call from any thread.
    pub fn stop(&self) {
        let discarded = self.shared.queue.close();
        if discarded > 0 {
            debug!(loop_name = %self.shared.name, discarded, "pending items discarded");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Number of items waiting in the queue, due or not.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Subscribes to the loop's `LoopEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LoopEvent> {
        self.shared.event_sender.subscribe()
    }

    fn emit(&self, event: LoopEvent) {
        self.shared.event_sender.send(event).ok();
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("name", &self.shared.name)
            .field("stopping", &self.is_stopping())
            .field("pending", &self.pending())
            .finish()
    }
}

/// A single-consumer dispatch loop.
///
/// The loop owns its handlers and its queue. `run` occupies the calling thread
/// and executes every hook, task and message handler there. Handlers are set
/// through `&mut self`, so they cannot change while `run` is executing.
pub struct MessageLoop {
    config: LoopConfig,
    handle: LoopHandle,
    on_start: Option<Hook>,
    on_stop: Option<Hook>,
    on_loop: Option<Hook>,
    on_handle: Option<MessageHandler>,
}

impl MessageLoop {
    /// Creates a loop with no handlers registered.
    pub fn new(config: LoopConfig) -> Self {
        let (event_sender, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            queue: DelayQueue::new(),
            event_sender,
        });
        Self {
            config,
            handle: LoopHandle { shared },
            on_start: None,
            on_stop: None,
            on_loop: None,
            on_handle: None,
        }
    }

    pub fn builder(config: LoopConfig) -> MessageLoopBuilder {
        MessageLoopBuilder {
            inner: Self::new(config),
        }
    }

    /// A handle for posting to and stopping this loop from other threads.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Runs once per `run`, on the loop thread, before the first dispatch.
    pub fn set_on_start(&mut self, hook: impl FnMut() + Send + 'static) -> &mut Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Runs once per `run`, on the loop thread, after the queue was closed.
    pub fn set_on_stop(&mut self, hook: impl FnMut() + Send + 'static) -> &mut Self {
        self.on_stop = Some(Box::new(hook));
        self
    }

    /// Runs at the top of every dispatch-cycle iteration.
    pub fn set_on_loop(&mut self, hook: impl FnMut() + Send + 'static) -> &mut Self {
        self.on_loop = Some(Box::new(hook));
        self
    }

    /// Receives every dispatched message. Without it, messages are dropped.
    pub fn set_on_handle(
        &mut self,
        handler: impl FnMut(Message) + Send + 'static,
    ) -> &mut Self {
        self.on_handle = Some(Box::new(handler));
        self
    }

    pub fn post_task(&self, task: impl FnOnce() + Send + 'static, delay_ms: u64) {
        self.handle.post_task(task, delay_ms);
    }

    pub fn post_message(&self, message: Message, delay_ms: u64) {
        self.handle.post_message(message, delay_ms);
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Runs the dispatch cycle on the calling thread until the loop is stopped.
    ///
    /// Each call starts a fresh cycle: the queue is reopened, which clears the
    /// stop state and accepts posts again in one step. Items posted while the
    /// loop was stopped are gone.
    pub fn run(&mut self) {
        let shared = self.handle.shared.clone();
        let span = info_span!("msgloop", name = %shared.name);
        let _enter = span.enter();

        shared.queue.reopen();
        info!(poll_interval_ms = self.config.poll_interval_ms, "loop starting");

        if let Some(hook) = self.on_start.as_mut() {
            guarded(&self.handle, None, hook);
        }
        self.handle.emit(LoopEvent::Started {
            name: shared.name.clone(),
        });

        let poll_interval = self.config.poll_interval().max(Duration::from_millis(1));
        let mut interrupted = 0;
        while !shared.queue.is_closed() {
            if let Some(hook) = self.on_loop.as_mut() {
                guarded(&self.handle, None, hook);
            }
            // `None` on a closed queue ends the cycle at the loop condition.
            let Some(item) = shared.queue.pop_due_or_wait(poll_interval) else {
                continue;
            };
            if shared.queue.is_closed() {
                // Stopped between the pop and now: the item must not run.
                interrupted = 1;
                break;
            }
            self.dispatch(item);
        }

        shared.queue.close();
        let discarded = shared.queue.take_discarded() + interrupted;
        if let Some(hook) = self.on_stop.as_mut() {
            guarded(&self.handle, None, hook);
        }
        info!(discarded, "loop stopped");
        self.handle.emit(LoopEvent::Stopped {
            name: shared.name.clone(),
            discarded,
        });
    }

    fn dispatch(&mut self, item: WorkItem) {
        let kind = item.kind();
        trace!(due_ms = item.due_ms(), seq = item.seq().0, %kind, "dispatching");
        match item.into_work() {
            Work::Task(task) => guarded(&self.handle, Some(kind), task),
            Work::Message(message) => match self.on_handle.as_mut() {
                Some(handler) => guarded(&self.handle, Some(kind), || handler(message)),
                None => trace!(what = message.what, "no message handler; message dropped"),
            },
        }
    }
}

impl fmt::Debug for MessageLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoop")
            .field("config", &self.config)
            .field("handle", &self.handle)
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("on_loop", &self.on_loop.is_some())
            .field("on_handle", &self.on_handle.is_some())
            .finish()
    }
}

/// Fluent construction of a `MessageLoop` with all handlers in place.
pub struct MessageLoopBuilder {
    inner: MessageLoop,
}

impl MessageLoopBuilder {
    pub fn on_start(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.inner.set_on_start(hook);
        self
    }

    pub fn on_stop(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.inner.set_on_stop(hook);
        self
    }

    pub fn on_loop(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.inner.set_on_loop(hook);
        self
    }

    pub fn on_handle(mut self, handler: impl FnMut(Message) + Send + 'static) -> Self {
        self.inner.set_on_handle(handler);
        self
    }

    /// A handle to the loop being built, for handlers that post back to it.
    pub fn handle(&self) -> LoopHandle {
        self.inner.handle()
    }

    pub fn build(self) -> MessageLoop {
        self.inner
    }
}

/// Runs `f`, containing any panic so the dispatch cycle survives it.
fn guarded(handle: &LoopHandle, kind: Option<ItemKind>, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let reason = panic_reason(panic.as_ref());
        match kind {
            Some(kind) => error!(%kind, %reason, "dispatched {} panicked", kind),
            None => error!(%reason, "lifecycle hook panicked"),
        }
        handle.emit(LoopEvent::HandlerPanicked {
            name: handle.name().to_string(),
            kind,
            reason,
        });
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
