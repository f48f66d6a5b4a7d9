//! Fiber - 専用スレッド 1 本で仕事を順番に実行する実行コンテキスト
//!
//! # 学習ポイント
//! - 所有権: worker スレッドだけが queue の consumer になる
//! - 状態遷移は `AtomicU8` の CAS（Active → Disposing → Disposed）
//! - dispose は冪等。work item の中から呼ばれたら join を省略してデッドロックを避ける
//! - Drop で dispose（join_on_drop = false なら close だけして join しない）
//!
//! # 構成
//! - builder: FiberBuilder（スレッド名・スタックサイズ・queue strategy など）
//! - config: serde で読み込める FiberConfig
//! - worker_loop: dequeue → キャンセル確認 → 実行 のループ

mod builder;
mod config;
mod worker_loop;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, Thread, ThreadId};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{Completion, DispatchError, FiberError, FiberId, Operation, WorkItem};
use crate::ports::{Dispatcher, MpscQueue};

pub use self::builder::FiberBuilder;
pub use self::config::FiberConfig;

/// Lifecycle of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FiberState {
    Active = 0,
    /// Queue closed; the in-flight item may still be running.
    Disposing = 1,
    /// Worker thread has left its loop.
    Disposed = 2,
}

impl FiberState {
    fn new_cell() -> AtomicU8 {
        AtomicU8::new(FiberState::Active as u8)
    }

    fn load(cell: &AtomicU8) -> Self {
        match cell.load(Ordering::SeqCst) {
            0 => FiberState::Active,
            1 => FiberState::Disposing,
            _ => FiberState::Disposed,
        }
    }

    fn store(cell: &AtomicU8, state: Self) {
        cell.store(state as u8, Ordering::SeqCst);
    }
}

struct FiberInner {
    id: FiberId,
    worker_thread: ThreadId,
    queue: Arc<dyn MpscQueue<WorkItem>>,
    state: Arc<AtomicU8>,
    thread_slot: Arc<OnceLock<Thread>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    join_on_drop: bool,
}

impl FiberInner {
    /// Active → Disposing and close the queue. Only the first caller wins.
    fn close(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                FiberState::Active as u8,
                FiberState::Disposing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if won {
            tracing::debug!(fiber_id = %self.id, pending = self.queue.len(), "disposing fiber");
            self.queue.close();
        }
        won
    }

    fn dispose(&self) {
        self.close();

        if thread::current().id() == self.worker_thread {
            // 自分自身の worker は join できない。ループは残りを捨てて自然に終わる
            return;
        }

        // join 中はロックを保持し、並行して dispose した側も停止まで待たせる
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::error!(fiber_id = %self.id, "fiber worker thread panicked");
                FiberState::store(&self.state, FiberState::Disposed);
            }
        }
    }
}

impl Drop for FiberInner {
    fn drop(&mut self) {
        if self.join_on_drop {
            self.dispose();
        } else {
            self.close();
        }
    }
}

/// A dedicated worker thread that runs submitted operations one at a time,
/// in submission order.
///
/// Cloning shares the same fiber. The last handle to go away disposes it.
///
/// # 使用例
/// ```ignore
/// let fiber = Fiber::new()?;
/// let answer = fiber.submit(Operation::func(|| Ok::<_, BoxError>(42))).await?;
/// fiber.dispose();
/// ```
#[derive(Clone)]
pub struct Fiber {
    inner: Arc<FiberInner>,
}

impl Fiber {
    /// Fiber with default options.
    pub fn new() -> Result<Self, FiberError> {
        FiberBuilder::new().build()
    }

    pub fn builder() -> FiberBuilder {
        FiberBuilder::new()
    }

    pub fn id(&self) -> FiberId {
        self.inner.id
    }

    pub fn state(&self) -> FiberState {
        FiberState::load(&self.inner.state)
    }

    /// Items queued and not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// The worker thread; `None` until the first item was taken.
    pub fn thread(&self) -> Option<Thread> {
        self.inner.thread_slot.get().cloned()
    }

    /// Is the caller running on this fiber's worker thread?
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.worker_thread
    }

    /// Enqueue and return a completion handle. Never blocks.
    pub fn submit<T: Send + 'static>(&self, operation: Operation<T>) -> Completion<T> {
        self.submit_with(operation, None)
    }

    /// Like [`Fiber::submit`]; a signal that fired by the time the worker
    /// dequeues the item resolves it as cancelled without running it.
    pub fn submit_with<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Completion<T> {
        let (item, completion) = WorkItem::new(operation, cancel);
        // close 済みなら item はその場で FiberDisposed として解決される
        if self.inner.queue.enqueue(item).is_err() {
            tracing::debug!(fiber_id = %self.inner.id, "submit on disposed fiber");
        }
        completion
    }

    /// Schedule without a handle. Failures are logged.
    pub fn fire(&self, operation: Operation<()>) {
        self.fire_with(operation, None);
    }

    pub fn fire_with(&self, operation: Operation<()>, cancel: Option<CancellationToken>) {
        drop(self.submit_with(operation, cancel));
    }

    /// Close the queue, let the in-flight item finish, and join the worker.
    ///
    /// Queued items that were not started resolve as cancelled. Safe to call
    /// more than once and from any thread; from the fiber's own thread the
    /// join is skipped.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// [`Fiber::dispose`] with the join moved onto tokio's blocking pool.
    pub async fn dispose_async(&self) {
        if self.is_current() {
            self.dispose();
            return;
        }
        let fiber = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || fiber.dispose()).await {
            tracing::error!(fiber_id = %self.inner.id, error = %e, "async dispose failed");
        }
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

#[async_trait]
impl Dispatcher for Fiber {
    fn dispatch_with(&self, operation: Operation<()>, cancel: Option<CancellationToken>) {
        self.fire_with(operation, cancel);
    }

    async fn enqueue_with<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, DispatchError> {
        self.submit_with(operation, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoxError, CancelReason};
    use crate::impls::QueueStrategy;
    use rstest::rstest;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Work item that reports when it starts and then waits for a release.
    fn gated<T: Send + 'static>(value: T) -> (Operation<T>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let mut value = Some(value);
        let op = Operation::func(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            value.take().ok_or_else(|| BoxError::from("gated operation ran twice"))
        });
        (op, started_rx, release_tx)
    }

    fn wait_for_state(fiber: &Fiber, state: FiberState) {
        for _ in 0..500 {
            if fiber.state() == state {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("fiber never reached {state:?}");
    }

    #[rstest]
    #[case::spinning(QueueStrategy::Spinning)]
    #[case::standard(QueueStrategy::Standard)]
    #[case::blocking(QueueStrategy::Blocking)]
    fn items_run_one_at_a_time_in_order(#[case] strategy: QueueStrategy) {
        let fiber = Fiber::builder().queue(strategy).build().unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let running = Arc::clone(&running);
                let seen = Arc::clone(&seen);
                fiber.submit(Operation::action(move || {
                    assert_eq!(running.fetch_add(1, Ordering::SeqCst), 0);
                    seen.lock().push(i);
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                }))
            })
            .collect();
        for h in handles {
            h.wait().unwrap();
        }

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
        fiber.dispose();
        assert_eq!(fiber.state(), FiberState::Disposed);
    }

    #[test]
    fn every_item_runs_on_the_worker_thread() {
        let fiber = Fiber::new().unwrap();
        assert!(fiber.thread().is_none());

        let ids: Vec<_> = (0..10)
            .map(|_| fiber.submit(Operation::func(|| Ok::<_, BoxError>(thread::current().id()))))
            .map(|h| h.wait().unwrap())
            .collect();

        let worker = fiber.thread().unwrap().id();
        assert!(ids.iter().all(|id| *id == worker));
        assert_ne!(worker, thread::current().id());
        assert!(!fiber.is_current());
    }

    #[test]
    fn thread_stays_unset_until_an_item_actually_runs() {
        let fiber = Fiber::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let skipped = fiber.submit_with(Operation::action(|| Ok::<_, BoxError>(())), Some(token));

        assert!(skipped.wait().unwrap_err().is_cancelled());
        assert!(fiber.thread().is_none());

        fiber.submit(Operation::action(|| Ok::<_, BoxError>(()))).wait().unwrap();
        assert!(fiber.thread().is_some());
    }

    #[test]
    fn panicking_thread_start_hook_shuts_the_fiber_down() {
        let fiber = Fiber::builder()
            .on_thread_start(|_| panic!("hook failed"))
            .build()
            .unwrap();

        let err = fiber
            .submit(Operation::func(|| Ok::<_, BoxError>(1)))
            .wait()
            .unwrap_err();
        assert_eq!(err.cancel_reason(), Some(CancelReason::FiberDisposed));

        fiber.dispose();
        assert_eq!(fiber.state(), FiberState::Disposed);
    }

    #[test]
    fn failing_items_do_not_stop_the_worker() {
        let fiber = Fiber::new().unwrap();
        let failed = fiber.submit(Operation::func(|| Err::<u8, _>(std::fmt::Error)));
        let panicked = fiber.submit(Operation::func(|| -> Result<u8, BoxError> { panic!("boom") }));
        let ok = fiber.submit(Operation::func(|| Ok::<_, BoxError>(3u8)));

        assert!(failed.wait().unwrap_err().downcast_cause::<std::fmt::Error>().is_some());
        assert!(panicked.wait().is_err());
        assert_eq!(ok.wait().unwrap(), 3);
    }

    #[test]
    fn signal_fired_before_dequeue_skips_payload() {
        let fiber = Fiber::new().unwrap();
        let (blocker, started, release) = gated(());
        let first = fiber.submit(blocker);
        started.recv().unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let token = CancellationToken::new();
        let second = fiber.submit_with(
            Operation::action(move || {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }),
            Some(token.clone()),
        );
        token.cancel();
        release.send(()).unwrap();

        first.wait().unwrap();
        assert_eq!(
            second.wait().unwrap_err().cancel_reason(),
            Some(CancelReason::Signalled)
        );
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn signal_fired_while_running_is_advisory() {
        let fiber = Fiber::new().unwrap();
        let token = CancellationToken::new();
        let (op, started, release) = gated(5);
        let handle = fiber.submit_with(op, Some(token.clone()));

        started.recv().unwrap();
        token.cancel();
        release.send(()).unwrap();

        assert_eq!(handle.wait().unwrap(), 5);
    }

    #[test]
    fn dispose_finishes_in_flight_and_cancels_queued() {
        let fiber = Fiber::new().unwrap();
        let (op, started, release) = gated("in flight");
        let in_flight = fiber.submit(op);
        started.recv().unwrap();
        let queued: Vec<_> = (0..3)
            .map(|_| fiber.submit(Operation::func(|| Ok::<_, BoxError>("queued"))))
            .collect();
        assert_eq!(fiber.pending(), 3);

        let disposer = {
            let fiber = fiber.clone();
            thread::spawn(move || fiber.dispose())
        };
        wait_for_state(&fiber, FiberState::Disposing);
        release.send(()).unwrap();
        disposer.join().unwrap();

        assert_eq!(fiber.state(), FiberState::Disposed);
        assert_eq!(in_flight.wait().unwrap(), "in flight");
        for h in queued {
            assert_eq!(
                h.wait().unwrap_err().cancel_reason(),
                Some(CancelReason::FiberDisposed)
            );
        }
    }

    #[test]
    fn submit_after_dispose_is_cancelled() {
        let fiber = Fiber::new().unwrap();
        fiber.dispose();
        let err = fiber
            .submit(Operation::func(|| Ok::<_, BoxError>(1)))
            .wait()
            .unwrap_err();
        assert_eq!(err.cancel_reason(), Some(CancelReason::FiberDisposed));
    }

    #[test]
    fn dispose_is_idempotent_across_threads() {
        let fiber = Fiber::new().unwrap();
        fiber.submit(Operation::action(|| Ok::<_, BoxError>(()))).wait().unwrap();

        let disposers: Vec<_> = (0..4)
            .map(|_| {
                let fiber = fiber.clone();
                thread::spawn(move || {
                    fiber.dispose();
                    fiber.state()
                })
            })
            .collect();
        for d in disposers {
            assert_eq!(d.join().unwrap(), FiberState::Disposed);
        }
        fiber.dispose();
        assert_eq!(fiber.state(), FiberState::Disposed);
    }

    #[test]
    fn dispose_from_inside_a_work_item_does_not_deadlock() {
        let fiber = Fiber::new().unwrap();
        let me = fiber.clone();
        let handle = fiber.submit(Operation::func(move || {
            me.dispose();
            Ok::<_, BoxError>(me.is_current())
        }));
        assert!(handle.wait().unwrap());

        fiber.dispose();
        assert_eq!(fiber.state(), FiberState::Disposed);
    }

    #[test]
    fn async_payload_stays_on_the_worker_thread() {
        let fiber = Fiber::new().unwrap();
        let (before, after) = fiber
            .submit(Operation::func_async(|| async {
                let before = thread::current().id();
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, BoxError>((before, thread::current().id()))
            }))
            .wait()
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(Some(before), fiber.thread().map(|t| t.id()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn two_producers_share_one_thread_in_order() {
        let fiber = Fiber::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let log = Arc::clone(&log);
            fiber.submit(Operation::func_async(move || {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    log.lock().push("first");
                    Ok::<_, BoxError>((42, thread::current().id()))
                }
            }))
        };

        let second = {
            let fiber = fiber.clone();
            let log = Arc::clone(&log);
            thread::spawn(move || {
                fiber.submit(Operation::func(move || {
                    log.lock().push("second");
                    Ok::<_, BoxError>(thread::current().id())
                }))
            })
            .join()
            .unwrap()
        };

        let (answer, first_thread) = first.await.unwrap();
        let second_thread = second.await.unwrap();
        assert_eq!(answer, 42);
        assert_eq!(first_thread, second_thread);
        assert_eq!(*log.lock(), vec!["first", "second"]);

        fiber.dispose_async().await;
        assert_eq!(fiber.state(), FiberState::Disposed);
    }

    #[tokio::test]
    async fn fiber_is_a_dispatcher() {
        async fn double<D: Dispatcher>(d: &D, n: u32) -> Result<u32, DispatchError> {
            d.enqueue(Operation::func(move || Ok::<_, BoxError>(n * 2))).await
        }

        let fiber = Fiber::new().unwrap();
        assert_eq!(double(&fiber, 21).await.unwrap(), 42);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut tx = Some(tx);
        fiber.dispatch(Operation::action(move || {
            if let Some(tx) = tx.take() {
                let _ = tx.send(thread::current().id());
            }
            Ok::<_, BoxError>(())
        }));
        assert_eq!(Some(rx.await.unwrap()), fiber.thread().map(|t| t.id()));
        fiber.dispose_async().await;
    }

    #[test]
    fn dropping_the_last_handle_joins_the_worker() {
        let fiber = Fiber::new().unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let (started_tx, started_rx) = mpsc::channel();
        let handle = fiber.submit(Operation::action(move || {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
            Ok::<_, BoxError>(())
        }));
        started_rx.recv().unwrap();

        drop(fiber);
        assert!(done.load(Ordering::SeqCst));
        handle.wait().unwrap();
    }

    #[test]
    fn background_fiber_drop_does_not_wait() {
        let fiber = Fiber::builder().join_on_drop(false).build().unwrap();
        let (op, started, release) = gated(7);
        let handle = fiber.submit(op);
        started.recv().unwrap();

        drop(fiber);
        release.send(()).unwrap();
        assert_eq!(handle.wait().unwrap(), 7);
    }
}
