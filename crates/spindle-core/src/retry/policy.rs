//! RetryPolicy - 任意の Dispatcher をラップしてリトライするデコレータ
//!
//! # 判定フロー（attempt index n は 0 から）
//! 1. 内側の dispatcher で実行
//! 2. 成功 → 終了
//! 3. キャンセル → そのまま返す（リトライしない）
//! 4. matcher に合わない失敗 → そのまま返す（待たない・回数を消費しない）
//! 5. 合う失敗で上限未満 → wait(n) だけ待つ（待機中も signal を監視）→ n += 1
//! 6. 合う失敗で上限到達 → Exhausted（最後の失敗を保持、attempts = 上限 + 1）
//!
//! # 学習ポイント
//! - デコレータ自身も Dispatcher なので、RetryPolicy を RetryPolicy で包める
//! - payload は `SharedOperation` で共有し、毎回同じ closure を呼ぶ

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::builder::RetryPolicyBuilder;
use super::matcher::ErrorMatcher;
use super::wait::WaitStrategy;
use crate::domain::{CancelReason, DispatchError, Operation};
use crate::impls::InlineDispatcher;
use crate::ports::Dispatcher;
use crate::runtime::drive_detached;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryLimit {
    Unlimited,
    Max(u32),
}

#[derive(Debug)]
struct PolicyConfig {
    matcher: ErrorMatcher,
    wait: WaitStrategy,
    limit: RetryLimit,
}

/// Re-attempts failed operations on a wrapped dispatcher.
///
/// Build one with [`RetryPolicy::match_all`], [`RetryPolicy::matching`],
/// [`RetryPolicy::matching_where`] or [`RetryPolicy::matching_kind_where`],
/// then point it at a dispatcher with [`RetryPolicy::with_dispatcher`]
/// (the default runs inline on the caller).
pub struct RetryPolicy<D = InlineDispatcher> {
    inner: Arc<D>,
    config: Arc<PolicyConfig>,
}

impl<D> Clone for RetryPolicy<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: Arc::clone(&self.config),
        }
    }
}

impl<D> std::fmt::Debug for RetryPolicy<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Retry every failure except cancellation.
    pub fn match_all() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(ErrorMatcher::all())
    }

    /// Retry failures that are, or wrap, an `E`.
    pub fn matching<E: StdError + 'static>() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(ErrorMatcher::kind::<E>())
    }

    pub fn matching_where<P>(predicate: P) -> RetryPolicyBuilder
    where
        P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        RetryPolicyBuilder::new(ErrorMatcher::predicate(predicate))
    }

    pub fn matching_kind_where<E, P>(condition: P) -> RetryPolicyBuilder
    where
        E: StdError + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        RetryPolicyBuilder::new(ErrorMatcher::kind_where(condition))
    }
}

impl<D> RetryPolicy<D> {
    pub(crate) fn from_parts(
        inner: Arc<D>,
        matcher: ErrorMatcher,
        wait: WaitStrategy,
        limit: RetryLimit,
    ) -> Self {
        Self {
            inner,
            config: Arc::new(PolicyConfig {
                matcher,
                wait,
                limit,
            }),
        }
    }

    /// The same policy over another dispatcher.
    pub fn with_dispatcher<D2>(&self, dispatcher: D2) -> RetryPolicy<D2> {
        self.with_shared_dispatcher(Arc::new(dispatcher))
    }

    pub fn with_shared_dispatcher<D2>(&self, dispatcher: Arc<D2>) -> RetryPolicy<D2> {
        RetryPolicy {
            inner: dispatcher,
            config: Arc::clone(&self.config),
        }
    }

    /// Maximum number of retries; `None` means unlimited.
    pub fn retry_limit(&self) -> Option<u32> {
        match self.config.limit {
            RetryLimit::Unlimited => None,
            RetryLimit::Max(n) => Some(n),
        }
    }

    pub fn wait_strategy(&self) -> &WaitStrategy {
        &self.config.wait
    }

    fn limit_reached(&self, retries_done: u32) -> bool {
        match self.config.limit {
            RetryLimit::Unlimited => false,
            RetryLimit::Max(n) => retries_done >= n,
        }
    }
}

impl<D: Dispatcher> RetryPolicy<D> {
    async fn run<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, DispatchError> {
        let shared = operation.share();
        let mut attempt: u32 = 0;

        loop {
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(DispatchError::Cancelled(CancelReason::Signalled));
            }

            let error = match self.inner.enqueue_with(shared.forward(), cancel.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(attempts = attempt + 1, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            if !self.config.matcher.matches(error.failure()) {
                return Err(error);
            }
            // 実行中に signal が発火していたら、上限到達よりキャンセルを優先する
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(DispatchError::Cancelled(CancelReason::Signalled));
            }
            if self.limit_reached(attempt) {
                tracing::warn!(attempts = attempt + 1, error = %error, "retry limit reached");
                return Err(DispatchError::Exhausted {
                    attempts: attempt.saturating_add(1),
                    last: error.into_cause(),
                });
            }

            let delay = self.config.wait.delay(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "attempt failed, retrying"
            );
            if backoff(delay, cancel.as_ref()).await {
                return Err(DispatchError::Cancelled(CancelReason::Signalled));
            }
            attempt = attempt.saturating_add(1);
        }
    }
}

/// Sleep for `delay`; returns `true` if the signal fired first.
async fn backoff(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) if !delay.is_zero() => {
            tokio::select! {
                _ = token.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            }
        }
        Some(token) => token.is_cancelled(),
        None => {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            false
        }
    }
}

#[async_trait]
impl<D: Dispatcher + 'static> Dispatcher for RetryPolicy<D> {
    fn dispatch_with(&self, operation: Operation<()>, cancel: Option<CancellationToken>) {
        let policy = self.clone();
        drive_detached(Box::pin(async move {
            if let Err(e) = policy.run(operation, cancel).await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "retried dispatch failed");
                }
            }
        }));
    }

    async fn enqueue_with<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, DispatchError> {
        self.run(operation, cancel).await
    }
}
