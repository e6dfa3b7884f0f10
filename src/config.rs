//! Service and per-index configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::WriterSettings;
use crate::error::{PhalanxError, Result};

/// Configuration of the index service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory under which every index gets its own subdirectory.
    pub base_directory: PathBuf,

    /// Field holding the object identifier in every document.
    pub id_field: String,

    /// Field searched by query terms without an explicit field.
    pub default_field: String,

    /// Disable optimize entirely (test mode).
    pub never_optimize: bool,

    /// Optimize after this many writer sessions. 0 disables the trigger.
    pub optimize_trigger_count: u32,

    /// Commands buffered per index before a flush.
    /// 0 disables the update queue, 1 applies every write on the calling thread.
    pub update_buffer_size: usize,

    /// Period of the buffer flush timer. Zero disables the timer.
    pub update_buffer_flush: Duration,

    /// Buffered documents for batch writers (reindex).
    pub batch_max_buffered_docs: u32,

    /// Merge factor for batch writers (reindex).
    pub batch_merge_factor: u32,

    /// Minimum age of a discarded reader before it may be closed.
    pub discarded_reader_min_close_delay: Duration,

    /// Period of the discarded reader sweep.
    pub discarded_reader_sweep_interval: Duration,

    /// Worker threads running reindex jobs and queued callbacks.
    pub callback_threads: usize,

    /// How long shutdown waits for running callbacks.
    pub shutdown_timeout: Duration,

    /// Poll interval while optimize waits for readers to finish.
    pub optimize_reader_poll: Duration,

    /// Upper bound on the optimize wait. `None` waits indefinitely.
    pub optimize_reader_wait: Option<Duration>,

    /// Fail initialization on configuration errors instead of continuing degraded.
    pub throw_on_init_failure: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("./indexes"),
            id_field: "id".to_string(),
            default_field: "Gtext".to_string(),
            never_optimize: false,
            optimize_trigger_count: 0,
            update_buffer_size: 1,
            update_buffer_flush: Duration::ZERO,
            batch_max_buffered_docs: 500,
            batch_merge_factor: 50,
            discarded_reader_min_close_delay: Duration::from_secs(60),
            discarded_reader_sweep_interval: Duration::from_secs(180),
            callback_threads: num_cpus::get(),
            shutdown_timeout: Duration::from_secs(3600),
            optimize_reader_poll: Duration::from_secs(1),
            optimize_reader_wait: None,
            throw_on_init_failure: false,
        }
    }
}

impl ServiceConfig {
    /// Create a configuration rooted at `base_directory`.
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            ..Default::default()
        }
    }

    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_directory.as_os_str().is_empty() {
            return Err(PhalanxError::config("base directory not configured"));
        }
        if self.id_field.is_empty() {
            return Err(PhalanxError::config("id field must not be empty"));
        }
        if self.default_field.is_empty() {
            return Err(PhalanxError::config("default field must not be empty"));
        }
        if self.callback_threads == 0 {
            return Err(PhalanxError::config("callback_threads must be at least 1"));
        }
        if self.optimize_reader_poll.is_zero() {
            return Err(PhalanxError::config("optimize_reader_poll must be positive"));
        }
        if self.discarded_reader_sweep_interval.is_zero() {
            return Err(PhalanxError::config(
                "discarded_reader_sweep_interval must be positive",
            ));
        }
        Ok(())
    }

    /// Writer settings used by batch (reindex) writer sessions.
    pub fn batch_settings(&self) -> WriterSettings {
        WriterSettings {
            max_buffered_docs: self.batch_max_buffered_docs,
            merge_factor: self.batch_merge_factor,
            use_compound_file: true,
        }
    }

    /// Whether writes go through the update queue at all.
    pub fn queue_enabled(&self) -> bool {
        self.update_buffer_size > 0
    }

    pub fn with_update_buffer(mut self, size: usize, flush: Duration) -> Self {
        self.update_buffer_size = size;
        self.update_buffer_flush = flush;
        self
    }

    pub fn with_optimize_trigger_count(mut self, count: u32) -> Self {
        self.optimize_trigger_count = count;
        self
    }

    pub fn with_never_optimize(mut self, never: bool) -> Self {
        self.never_optimize = never;
        self
    }

    pub fn with_discarded_reader_timing(mut self, min_close_delay: Duration, sweep: Duration) -> Self {
        self.discarded_reader_min_close_delay = min_close_delay;
        self.discarded_reader_sweep_interval = sweep;
        self
    }

    pub fn with_optimize_reader_wait(mut self, poll: Duration, wait: Option<Duration>) -> Self {
        self.optimize_reader_poll = poll;
        self.optimize_reader_wait = wait;
        self
    }

    pub fn with_callback_threads(mut self, threads: usize) -> Self {
        self.callback_threads = threads;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_throw_on_init_failure(mut self, throw: bool) -> Self {
        self.throw_on_init_failure = throw;
        self
    }
}

/// Interactive writer tuning for one index, supplied by its plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub min_merge_docs: u32,
    pub merge_factor: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_merge_docs: 10,
            merge_factor: 10,
        }
    }
}

impl IndexConfig {
    pub fn new(min_merge_docs: u32, merge_factor: u32) -> Self {
        Self {
            min_merge_docs,
            merge_factor,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_merge_docs == 0 || self.merge_factor < 2 {
            return Err(PhalanxError::config(format!(
                "invalid merge configuration: min_merge_docs={}, merge_factor={}",
                self.min_merge_docs, self.merge_factor
            )));
        }
        Ok(())
    }

    /// Writer settings used by interactive writer sessions.
    pub fn interactive_settings(&self) -> WriterSettings {
        WriterSettings {
            max_buffered_docs: self.min_merge_docs,
            merge_factor: self.merge_factor,
            use_compound_file: true,
        }
    }
}
