//! RetryPolicyBuilder - matcher → wait → 上限 の順に組み立てる
//!
//! ```ignore
//! let policy = RetryPolicy::matching::<Timeout>()
//!     .and::<Refused>()
//!     .with_wait_sequence([ms(100), ms(200), ms(300)])
//!     .with_max_retries(5);
//! ```
//! 上限（`forever` / `with_max_retries`）を決めた時点で RetryPolicy になります。

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use super::matcher::ErrorMatcher;
use super::policy::{RetryLimit, RetryPolicy};
use super::wait::WaitStrategy;
use crate::impls::InlineDispatcher;

#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    matcher: ErrorMatcher,
    wait: WaitStrategy,
}

impl RetryPolicyBuilder {
    pub fn new(matcher: ErrorMatcher) -> Self {
        Self {
            matcher,
            wait: WaitStrategy::None,
        }
    }

    /// Also retry failures of kind `E`.
    pub fn and<E: StdError + 'static>(mut self) -> Self {
        self.matcher = self.matcher.or_kind::<E>();
        self
    }

    pub fn with_wait(mut self, delay: Duration) -> Self {
        self.wait = WaitStrategy::Fixed(delay);
        self
    }

    pub fn with_wait_sequence<I: IntoIterator<Item = Duration>>(mut self, delays: I) -> Self {
        self.wait = WaitStrategy::sequence(delays);
        self
    }

    /// `f` receives the 1-based number of the attempt that just failed.
    pub fn with_wait_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.wait = WaitStrategy::function(f);
        self
    }

    pub fn with_wait_strategy(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    /// Retry matching failures without limit.
    pub fn forever(self) -> RetryPolicy {
        self.finish(RetryLimit::Unlimited)
    }

    /// Allow at most `retries` retries, i.e. `retries + 1` attempts.
    pub fn with_max_retries(self, retries: u32) -> RetryPolicy {
        self.finish(RetryLimit::Max(retries))
    }

    fn finish(self, limit: RetryLimit) -> RetryPolicy {
        RetryPolicy::from_parts(
            Arc::new(InlineDispatcher),
            self.matcher,
            self.wait,
            limit,
        )
    }
}
