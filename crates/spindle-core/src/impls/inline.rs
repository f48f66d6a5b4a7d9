//! InlineDispatcher - 呼び出し元でその場で実行する Dispatcher
//!
//! キューもスレッドも持たないベースライン実装です。
//! RetryPolicy のデフォルトの内側 dispatcher として使われます。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{CancelReason, DispatchError, Operation};
use crate::ports::Dispatcher;
use crate::runtime::drive_detached;

/// Executes every operation immediately on the caller's thread (or task).
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl InlineDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dispatcher for InlineDispatcher {
    fn dispatch_with(&self, mut operation: Operation<()>, cancel: Option<CancellationToken>) {
        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return;
        }

        if let Some(result) = operation.attempt_blocking() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "inline dispatch failed");
            }
            return;
        }

        drive_detached(Box::pin(async move {
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return;
            }
            if let Err(e) = operation.attempt().await {
                tracing::warn!(error = %e, "inline dispatch failed");
            }
        }));
    }

    async fn enqueue_with<T: Send + 'static>(
        &self,
        mut operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, DispatchError> {
        if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(DispatchError::Cancelled(CancelReason::Signalled));
        }
        operation.attempt().await.map_err(DispatchError::from_payload)
    }
}
