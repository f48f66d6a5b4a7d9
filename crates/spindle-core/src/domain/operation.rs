//! Operation - 遅延実行される処理（payload）
//!
//! 4 種類の payload の形を 1 つの tagged enum で表します。
//!
//! | 形                         | コンストラクタ                   |
//! |----------------------------|----------------------------------|
//! | 戻り値なし                 | [`Operation::action`]            |
//! | 戻り値なし（非同期）       | [`Operation::action_async`]      |
//! | 戻り値あり                 | [`Operation::func`]              |
//! | 戻り値あり（非同期）       | [`Operation::func_async`]        |
//!
//! どの形でも [`Operation::attempt`] で「1 回実行 → 値 or 失敗」を得られます。
//! リトライで同じ payload を何度も呼ぶため、closure は `FnMut` です。
//!
//! # 学習ポイント
//! - 戻り値の型 `T` をジェネリクスに残し、同期/非同期だけを variant にする
//! - `Arc<Mutex<..>>` で payload を共有し、新しい Operation として転送する（[`SharedOperation`]）

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use super::errors::BoxError;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type SyncFn<T> = Box<dyn FnMut() -> Result<T, BoxError> + Send>;
type AsyncFn<T> = Box<dyn FnMut() -> BoxFuture<Result<T, BoxError>> + Send>;

/// A deferred, repeatable unit of work producing `T`.
pub enum Operation<T> {
    /// Runs to completion on the calling thread.
    Blocking(SyncFn<T>),
    /// Produces a future; whoever executes the operation drives it.
    Async(AsyncFn<T>),
}

impl Operation<()> {
    /// No-result payload.
    pub fn action<F, E>(mut f: F) -> Self
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Operation::Blocking(Box::new(move || -> Result<(), BoxError> {
            f().map_err(Into::into)
        }))
    }

    /// No-result asynchronous payload.
    pub fn action_async<F, Fut, E>(f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::func_async(f)
    }
}

impl<T: Send + 'static> Operation<T> {
    /// Result-producing payload.
    pub fn func<F, E>(mut f: F) -> Self
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Operation::Blocking(Box::new(move || -> Result<T, BoxError> {
            f().map_err(Into::into)
        }))
    }

    /// Result-producing asynchronous payload.
    pub fn func_async<F, Fut, E>(mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Operation::Async(Box::new(move || -> BoxFuture<Result<T, BoxError>> {
            let fut = f();
            Box::pin(async move {
                let result: Result<T, BoxError> = fut.await.map_err(Into::into);
                result
            })
        }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Operation::Async(_))
    }

    /// Invoke the payload once.
    ///
    /// A blocking payload runs when the returned future is first polled, so
    /// polling on a given thread runs the payload on that thread.
    pub async fn attempt(&mut self) -> Result<T, BoxError> {
        match self {
            Operation::Blocking(f) => f(),
            Operation::Async(f) => f().await,
        }
    }

    /// Invoke a blocking payload without an executor.
    ///
    /// Returns `None` for async payloads.
    pub fn attempt_blocking(&mut self) -> Option<Result<T, BoxError>> {
        match self {
            Operation::Blocking(f) => Some(f()),
            Operation::Async(_) => None,
        }
    }

    /// Make the payload shareable so it can be re-submitted many times.
    pub fn share(self) -> SharedOperation<T> {
        match self {
            Operation::Blocking(f) => SharedOperation::Blocking(Arc::new(Mutex::new(f))),
            Operation::Async(f) => SharedOperation::Async(Arc::new(Mutex::new(f))),
        }
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Blocking(_) => f.write_str("Operation::Blocking(..)"),
            Operation::Async(_) => f.write_str("Operation::Async(..)"),
        }
    }
}

/// The same payload, callable from several freshly built [`Operation`]s.
///
/// The retry decorator hands a new forwarding operation to its inner
/// dispatcher on every attempt; all of them call the one original closure.
pub enum SharedOperation<T> {
    Blocking(Arc<Mutex<SyncFn<T>>>),
    Async(Arc<Mutex<AsyncFn<T>>>),
}

impl<T> Clone for SharedOperation<T> {
    fn clone(&self) -> Self {
        match self {
            SharedOperation::Blocking(f) => SharedOperation::Blocking(Arc::clone(f)),
            SharedOperation::Async(f) => SharedOperation::Async(Arc::clone(f)),
        }
    }
}

impl<T: Send + 'static> SharedOperation<T> {
    /// Build an operation of the same shape that forwards to the shared payload.
    pub fn forward(&self) -> Operation<T> {
        match self {
            SharedOperation::Blocking(f) => {
                let f = Arc::clone(f);
                Operation::Blocking(Box::new(move || -> Result<T, BoxError> {
                    let mut call = f.lock();
                    (&mut **call)()
                }))
            }
            SharedOperation::Async(f) => {
                let f = Arc::clone(f);
                // ロックは future を作る間だけ保持し、await を跨がない
                Operation::Async(Box::new(move || -> BoxFuture<Result<T, BoxError>> {
                    let mut make = f.lock();
                    (&mut **make)()
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn func_returns_value() {
        let mut op = Operation::func(|| Ok::<_, BoxError>(42));
        assert_eq!(op.attempt().await.unwrap(), 42);
        assert!(!op.is_async());
    }

    #[tokio::test]
    async fn func_async_returns_value() {
        let mut op = Operation::func_async(|| async { Ok::<_, BoxError>("done") });
        assert!(op.is_async());
        assert_eq!(op.attempt().await.unwrap(), "done");
        assert!(op.attempt_blocking().is_none());
    }

    #[tokio::test]
    async fn action_error_is_boxed() {
        let mut op = Operation::action(|| Err::<(), _>(std::fmt::Error));
        let err = op.attempt().await.unwrap_err();
        assert!(err.is::<std::fmt::Error>());
    }

    #[test]
    fn operation_is_repeatable() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut op = Operation::action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(())
        });
        for _ in 0..3 {
            op.attempt_blocking().unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn forwarded_operations_share_one_payload() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let shared = Operation::func_async(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, BoxError>(n) }
        })
        .share();

        assert_eq!(shared.forward().attempt().await.unwrap(), 1);
        assert_eq!(shared.clone().forward().attempt().await.unwrap(), 2);
        assert!(shared.forward().is_async());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
