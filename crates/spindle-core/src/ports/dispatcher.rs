//! Dispatcher port - 仕事を実行コンテキストに投入するための共通インターフェース
//!
//! # 実装
//! - **Fiber**: 専用スレッド 1 本で順番に実行
//! - **InlineDispatcher**: 呼び出し元スレッドでその場で実行（ベースライン）
//! - **RetryPolicy**: 任意の Dispatcher をラップしてリトライ
//!
//! actor adapter などの利用側はこの trait だけに依存します。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{DispatchError, Operation};

/// Uniform submission surface.
///
/// Every payload shape goes through [`Operation`]; the `*_with` methods take
/// an optional cancellation signal, the short forms pass none.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Schedule without a completion handle.
    ///
    /// Ordering and cancellation rules are the same as for
    /// [`Dispatcher::enqueue_with`]; failures are only logged.
    fn dispatch_with(&self, operation: Operation<()>, cancel: Option<CancellationToken>);

    /// Submit and wait for the outcome.
    async fn enqueue_with<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, DispatchError>;

    fn dispatch(&self, operation: Operation<()>) {
        self.dispatch_with(operation, None);
    }

    async fn enqueue<T: Send + 'static>(&self, operation: Operation<T>) -> Result<T, DispatchError> {
        self.enqueue_with(operation, None).await
    }

    async fn enqueue_cancellable<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: CancellationToken,
    ) -> Result<T, DispatchError> {
        self.enqueue_with(operation, Some(cancel)).await
    }
}
