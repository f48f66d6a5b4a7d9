//! Wait strategy: decides backoff delays between attempts.

use std::sync::Arc;
use std::time::Duration;

type WaitFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How long to wait before the next retry.
#[derive(Clone, Default)]
pub enum WaitStrategy {
    /// Retry immediately.
    #[default]
    None,
    /// Same delay before every retry.
    Fixed(Duration),
    /// One entry per retry; the last entry repeats once the list runs out.
    Sequence(Arc<[Duration]>),
    /// Called with the 1-based number of the attempt that just failed.
    Function(WaitFn),
}

impl WaitStrategy {
    pub fn sequence<I: IntoIterator<Item = Duration>>(delays: I) -> Self {
        WaitStrategy::Sequence(delays.into_iter().collect())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        WaitStrategy::Function(Arc::new(f))
    }

    /// Delay after the failure of attempt `retry_index` (0-based).
    ///
    /// Example with a sequence of `[100ms, 200ms, 300ms]`:
    /// - index 0: 100ms
    /// - index 1: 200ms
    /// - index 2 and later: 300ms
    pub fn delay(&self, retry_index: u32) -> Duration {
        match self {
            WaitStrategy::None => Duration::ZERO,
            WaitStrategy::Fixed(d) => *d,
            WaitStrategy::Sequence(delays) => {
                let Some(last) = delays.len().checked_sub(1) else {
                    return Duration::ZERO;
                };
                delays[(retry_index as usize).min(last)]
            }
            WaitStrategy::Function(f) => f(retry_index.saturating_add(1)),
        }
    }
}

impl std::fmt::Debug for WaitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitStrategy::None => f.write_str("None"),
            WaitStrategy::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            WaitStrategy::Sequence(delays) => f.debug_tuple("Sequence").field(delays).finish(),
            WaitStrategy::Function(_) => f.write_str("Function(..)"),
        }
    }
}
