//! Contains the building blocks of a dispatch loop.
//!
//! This module provides the message and payload types producers post, the
//! work item stored for each post, and the delay queue that orders them.
//! The `MessageLoop` owns one queue and drains it on its own thread.

pub mod item;
pub mod payload;
pub mod queue;
