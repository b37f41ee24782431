//! # Msgloop
//!
//! A single-consumer, multi-producer, delay-ordered dispatch loop.
//!
//! Any number of threads post deferred closures ("tasks") or structured
//! [`Message`](components::payload::Message)s to a loop, each with an optional
//! delay. Exactly one thread, the one that called `run`, executes them
//! strictly in due-time order.
//!
//! ## Core Concepts
//!
//! - **MonotonicClock**: The single source of time. Due times are whole
//!   milliseconds since a process-wide monotonic epoch.
//! - **DelayQueue**: A locked min-heap of work items. The loop thread waits on
//!   it for exactly as long as the earliest item needs, capped by the
//!   configured poll interval.
//! - **MessageLoop / LoopHandle**: The loop owns its handlers and runs on one
//!   thread; cloneable handles post work and stop it from anywhere.
//! - **Event-Driven**: Lifecycle changes are broadcast as `LoopEvent`s that
//!   any number of subscribers can observe.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use msgloop::prelude::*;
//! use std::thread;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut event_loop = MessageLoop::builder(LoopConfig::named("worker"))
//!         .on_handle(|mut msg: Message| {
//!             let value: i32 = msg.take().unwrap_or_default();
//!             println!("what={} value={}", msg.what, value);
//!         })
//!         .build();
//!
//!     let handle = event_loop.handle();
//!     let worker = thread::spawn(move || event_loop.run());
//!
//!     handle.post_message(Message::new(1).with_payload(42_i32), 100);
//!     handle.post_task(|| println!("runs right away"), 0);
//!     let stopper = handle.clone();
//!     handle.post_task_after(move || stopper.stop(), std::time::Duration::from_millis(200));
//!
//!     worker.join().ok();
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Msgloop";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod time;

/// A prelude module for easy importing of the most common Msgloop types.
pub mod prelude {
    pub use crate::common::{ItemKind, Seq};
    pub use crate::components::payload::{Message, Payload};
    pub use crate::config::LoopConfig;
    pub use crate::engine::{LoopHandle, MessageLoop, MessageLoopBuilder};
    pub use crate::error::{PayloadError, PostError};
    pub use crate::events::LoopEvent;
}
