//! WorkItem - キューに積まれる 1 件の仕事
//!
//! # 学習ポイント
//! - Type erasure パターン: `TypedJob<T>` を `dyn Job` に変換して
//!   戻り値の型が異なる item を 1 つのキューに入れる
//! - `self: Box<Self>` で消費することで「完了ハンドルは 1 回だけ解決される」を型で保証する
//! - oneshot の Sender が drop されたら Receiver 側でキャンセル扱いにする（未解決のまま残さない）

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::errors::{CancelReason, DispatchError, PayloadPanicked};
use super::ids::WorkItemId;
use super::operation::Operation;

/// Completion state delivered to a [`Completion`].
pub type Resolution<T> = Result<T, DispatchError>;

/// Object-safe half of a work item: run it, or resolve it as cancelled.
trait Job: Send {
    fn run(self: Box<Self>, runtime: &Runtime) -> Outcome;
    fn cancel(self: Box<Self>, reason: CancelReason);
}

/// What happened when a work item was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

struct TypedJob<T> {
    operation: Operation<T>,
    tx: Option<oneshot::Sender<Resolution<T>>>,
}

impl<T: Send + 'static> TypedJob<T> {
    fn resolve(&mut self, resolution: Resolution<T>) {
        if let Some(tx) = self.tx.take() {
            // Receiver が drop 済み（fire した item）なら失敗だけログに残す
            if let Err(Err(e)) = tx.send(resolution) {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "unobserved work item failed");
                }
            }
        }
    }
}

impl<T: Send + 'static> Job for TypedJob<T> {
    fn run(mut self: Box<Self>, runtime: &Runtime) -> Outcome {
        let operation = &mut self.operation;
        let result = catch_unwind(AssertUnwindSafe(|| match operation.attempt_blocking() {
            Some(result) => result,
            None => runtime.block_on(operation.attempt()),
        }));

        let resolution = match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(DispatchError::from_payload(error)),
            Err(panic) => Err(DispatchError::Operation(Box::new(
                PayloadPanicked::from_panic(panic),
            ))),
        };

        let outcome = match &resolution {
            Ok(_) => Outcome::Succeeded,
            Err(e) if e.is_cancelled() => Outcome::Cancelled,
            Err(e) => {
                tracing::debug!(error = %e, "work item failed");
                Outcome::Failed
            }
        };
        self.resolve(resolution);
        outcome
    }

    fn cancel(mut self: Box<Self>, reason: CancelReason) {
        self.resolve(Err(DispatchError::Cancelled(reason)));
    }
}

/// One deferred operation plus its cancellation signal and completion handle.
pub struct WorkItem {
    id: WorkItemId,
    cancel: Option<CancellationToken>,
    job: Box<dyn Job>,
}

impl WorkItem {
    /// Wrap an operation; the returned [`Completion`] resolves exactly once.
    pub fn new<T: Send + 'static>(
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> (Self, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        let item = Self {
            id: WorkItemId::generate(),
            cancel,
            job: Box::new(TypedJob {
                operation,
                tx: Some(tx),
            }),
        };
        (item, Completion { rx })
    }

    pub fn id(&self) -> WorkItemId {
        self.id
    }

    /// Has the item's signal fired?
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Execute the payload on the current thread.
    ///
    /// Async payloads are driven to completion by `runtime` without leaving
    /// this thread. Panics are captured as operation failures.
    pub fn execute(self, runtime: &Runtime) -> Outcome {
        self.job.run(runtime)
    }

    /// Resolve as cancelled without invoking the payload.
    pub fn cancel(self, reason: CancelReason) {
        self.job.cancel(reason);
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Completion handle of a submitted work item.
///
/// Await it from async code, or call [`Completion::wait`] to block the
/// current thread explicitly.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Resolution<T>>,
}

impl<T> Completion<T> {
    /// Block the current thread until the item resolves.
    ///
    /// Must not be called from inside an async runtime; await the handle there.
    pub fn wait(self) -> Resolution<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(DispatchError::Cancelled(CancelReason::Abandoned)))
    }

    /// Non-blocking check; `None` while the item is still pending.
    pub fn try_take(&mut self) -> Option<Resolution<T>> {
        match self.rx.try_recv() {
            Ok(resolution) => Some(resolution),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(DispatchError::Cancelled(CancelReason::Abandoned)))
            }
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Resolution<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or(Err(DispatchError::Cancelled(CancelReason::Abandoned)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{BoxError, OperationCancelled};
    use crate::runtime::fiber_runtime;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn execute_resolves_value() {
        let rt = fiber_runtime().unwrap();
        let (item, handle) = WorkItem::new(Operation::func(|| Ok::<_, BoxError>(7)), None);
        assert_eq!(item.execute(&rt), Outcome::Succeeded);
        assert_eq!(handle.wait().unwrap(), 7);
    }

    #[test]
    fn execute_drives_async_payload() {
        let rt = fiber_runtime().unwrap();
        let (item, handle) = WorkItem::new(
            Operation::func_async(|| async {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok::<_, BoxError>(std::thread::current().id())
            }),
            None,
        );
        item.execute(&rt);
        assert_eq!(handle.wait().unwrap(), std::thread::current().id());
    }

    #[test]
    fn cancel_never_invokes_payload() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let (item, handle) = WorkItem::new(
            Operation::action(move || {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }),
            None,
        );
        item.cancel(CancelReason::Signalled);
        let err = handle.wait().unwrap_err();
        assert_eq!(err.cancel_reason(), Some(CancelReason::Signalled));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn panic_is_captured_as_failure() {
        let rt = fiber_runtime().unwrap();
        let (item, handle) = WorkItem::new(
            Operation::action(|| -> Result<(), BoxError> { panic!("kaboom") }),
            None,
        );
        assert_eq!(item.execute(&rt), Outcome::Failed);
        let err = handle.wait().unwrap_err();
        assert_eq!(err.downcast_cause::<PayloadPanicked>().unwrap().message, "kaboom");
    }

    #[test]
    fn cooperative_cancellation_resolves_cancelled() {
        let rt = fiber_runtime().unwrap();
        let (item, handle) = WorkItem::new(
            Operation::func(|| Err::<u8, _>(OperationCancelled)),
            None,
        );
        assert_eq!(item.execute(&rt), Outcome::Cancelled);
        assert_eq!(
            handle.wait().unwrap_err().cancel_reason(),
            Some(CancelReason::Cooperative)
        );
    }

    #[test]
    fn dropped_item_resolves_abandoned() {
        let (item, mut handle) = WorkItem::new(Operation::action(|| Ok::<_, BoxError>(())), None);
        assert!(handle.try_take().is_none());
        drop(item);
        let err = handle.try_take().unwrap().unwrap_err();
        assert_eq!(err.cancel_reason(), Some(CancelReason::Abandoned));
    }

    #[test]
    fn signal_is_observed() {
        let token = CancellationToken::new();
        let (item, _handle) = WorkItem::new(Operation::action(|| Ok::<_, BoxError>(())), Some(token.clone()));
        assert!(!item.is_cancelled());
        token.cancel();
        assert!(item.is_cancelled());
    }
}
