//! Defines the configuration of a `MessageLoop`.
//!
//! `LoopConfig` can be built in code or loaded from layered sources: built-in
//! defaults, then an optional TOML file, then `MSGLOOP_*` environment
//! variables. This keeps tuning such as the poll interval out of application
//! code.

use anyhow::{ensure, Context};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `MSGLOOP_POLL_INTERVAL_MS=25`.
pub const ENV_PREFIX: &str = "MSGLOOP";

/// The configuration for one `MessageLoop`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// A human-readable label for logging and lifecycle events.
    pub name: String,

    /// Upper bound on how long the loop thread blocks waiting for work before
    /// it re-checks its stop flag and runs the `on_loop` hook again.
    pub poll_interval_ms: u64,

    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: "loop".to_string(),
            poll_interval_ms: 10,
            event_capacity: 64,
        }
    }
}

impl LoopConfig {
    /// Defaults with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Loads a configuration from an optional TOML file and the environment.
    ///
    /// Later sources override earlier ones: defaults, the file at `path`,
    /// then `MSGLOOP_*` variables. The result is validated before returning.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let loaded: LoopConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to read loop configuration")?
            .try_deserialize()
            .context("invalid loop configuration")?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Rejects settings the loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be greater than 0");
        ensure!(self.event_capacity > 0, "event_capacity must be greater than 0");
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
