//! WorkerLoop - fiber の専用スレッドで回るループ
//!
//! # フロー
//! 1. MpscQueue::dequeue() で次の item を取得（空なら strategy ごとの方法で待つ）
//! 2. fiber が Disposing なら payload を呼ばずに FiberDisposed でキャンセル
//! 3. item の signal が発火済みなら Signalled でキャンセル
//! 4. それ以外はこのスレッドで実行し、完了ハンドルを解決
//! 5. dequeue が None（close 済みかつ空）になったら終了
//!
//! 終了時（panic を含む）は ExitGuard が queue を close し、残りを FiberDisposed で解決して Disposed にする

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};

use tokio::runtime::Runtime;

use super::FiberState;
use crate::domain::{CancelReason, FiberId, Outcome, WorkItem};
use crate::ports::MpscQueue;

/// Everything the worker thread owns.
pub(super) struct WorkerContext {
    pub(super) fiber_id: FiberId,
    pub(super) queue: Arc<dyn MpscQueue<WorkItem>>,
    pub(super) runtime: Runtime,
    pub(super) state: Arc<AtomicU8>,
    pub(super) thread_slot: Arc<OnceLock<Thread>>,
    pub(super) on_start: Option<Box<dyn FnOnce(&Thread) + Send + 'static>>,
}

/// Shuts the fiber down however the loop exits, including by a panic in the
/// thread-start hook. Later submissions are rejected instead of piling up in a
/// queue nobody drains.
struct ExitGuard {
    fiber_id: FiberId,
    queue: Arc<dyn MpscQueue<WorkItem>>,
    state: Arc<AtomicU8>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if FiberState::load(&self.state) == FiberState::Active {
            FiberState::store(&self.state, FiberState::Disposing);
        }
        self.queue.close();
        while let Some(item) = self.queue.dequeue() {
            item.cancel(CancelReason::FiberDisposed);
        }
        FiberState::store(&self.state, FiberState::Disposed);
        if thread::panicking() {
            tracing::error!(fiber_id = %self.fiber_id, "fiber worker stopped by a panic");
        }
    }
}

pub(super) fn run(ctx: WorkerContext) {
    let WorkerContext {
        fiber_id,
        queue,
        runtime,
        state,
        thread_slot,
        on_start,
    } = ctx;
    let _guard = ExitGuard {
        fiber_id,
        queue: Arc::clone(&queue),
        state: Arc::clone(&state),
    };

    if let Some(hook) = on_start {
        hook(&thread::current());
    }

    let mut executed = 0u64;
    while let Some(item) = queue.dequeue() {
        if FiberState::load(&state) != FiberState::Active {
            item.cancel(CancelReason::FiberDisposed);
            continue;
        }
        // signal は dequeue 直後、payload を呼ぶ前に 1 回だけ確認する
        if item.is_cancelled() {
            tracing::debug!(%fiber_id, item_id = %item.id(), "skipping cancelled work item");
            item.cancel(CancelReason::Signalled);
            continue;
        }

        let item_id = item.id();
        // thread() は最初に実行された item から見えるようにする
        thread_slot.get_or_init(thread::current);
        match item.execute(&runtime) {
            Outcome::Succeeded => {}
            outcome => tracing::debug!(%fiber_id, %item_id, ?outcome, "work item did not succeed"),
        }
        executed += 1;
    }

    tracing::debug!(%fiber_id, executed, "fiber worker stopped");
}
