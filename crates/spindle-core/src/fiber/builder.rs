//! FiberBuilder - fiber の構築
//!
//! # 学習ポイント
//! - Builder パターン（設定を積み上げて最後に build）
//! - 起動時検証: 不正な設定はスレッドを作る前に FiberError で返す

use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};

use parking_lot::Mutex;

use super::config::FiberConfig;
use super::worker_loop::{self, WorkerContext};
use super::{Fiber, FiberInner, FiberState};
use crate::domain::{FiberError, FiberId, WorkItem};
use crate::impls::QueueStrategy;
use crate::ports::MpscQueue;
use crate::runtime::fiber_runtime;

type ThreadStartHook = Box<dyn FnOnce(&Thread) + Send + 'static>;

/// Builds a [`Fiber`].
///
/// # 使用例
/// ```ignore
/// let fiber = Fiber::builder()
///     .name("db-writer")
///     .queue(QueueStrategy::Blocking)
///     .build()?;
/// ```
pub struct FiberBuilder {
    config: FiberConfig,
    on_thread_start: Option<ThreadStartHook>,
}

impl FiberBuilder {
    pub fn new() -> Self {
        Self::from_config(FiberConfig::default())
    }

    pub fn from_config(config: FiberConfig) -> Self {
        Self {
            config,
            on_thread_start: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    pub fn queue(mut self, strategy: QueueStrategy) -> Self {
        self.config.queue = strategy;
        self
    }

    /// Foreground (`true`, the default) or background (`false`) worker.
    pub fn join_on_drop(mut self, join: bool) -> Self {
        self.config.join_on_drop = join;
        self
    }

    /// Run once on the new worker thread, before it takes any work.
    pub fn on_thread_start<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Thread) + Send + 'static,
    {
        self.on_thread_start = Some(Box::new(hook));
        self
    }

    /// Validate the options, then start the worker thread.
    pub fn build(self) -> Result<Fiber, FiberError> {
        self.config.validate()?;

        let id = FiberId::generate();
        let name = self.config.name.clone().unwrap_or_else(|| id.short());
        let queue: Arc<dyn MpscQueue<WorkItem>> = self.config.queue.build();
        let runtime = fiber_runtime().map_err(FiberError::Runtime)?;
        let state = Arc::new(FiberState::new_cell());
        let thread_slot = Arc::new(OnceLock::new());

        let ctx = WorkerContext {
            fiber_id: id,
            queue: Arc::clone(&queue),
            runtime,
            state: Arc::clone(&state),
            thread_slot: Arc::clone(&thread_slot),
            on_start: self.on_thread_start,
        };

        let mut spawner = thread::Builder::new().name(name.clone());
        if let Some(bytes) = self.config.stack_size {
            spawner = spawner.stack_size(bytes);
        }
        let handle = spawner
            .spawn(move || worker_loop::run(ctx))
            .map_err(FiberError::Spawn)?;

        tracing::debug!(fiber_id = %id, thread = %name, queue = ?self.config.queue, "fiber started");

        Ok(Fiber {
            inner: Arc::new(FiberInner {
                id,
                worker_thread: handle.thread().id(),
                queue,
                state,
                thread_slot,
                worker: Mutex::new(Some(handle)),
                join_on_drop: self.config.join_on_drop,
            }),
        })
    }
}

impl Default for FiberBuilder {
    fn default() -> Self {
        Self::new()
    }
}
