//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SpinningQueue / StandardQueue / BlockingQueue**: MpscQueue の 3 つの待ち方
//! - **InlineDispatcher**: 呼び出し元スレッドで同期実行する Dispatcher

mod gate;

pub mod blocking;
pub mod inline;
pub mod spinning;
pub mod standard;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ports::{MpscQueue, Reject};

pub use self::blocking::BlockingQueue;
pub use self::inline::InlineDispatcher;
pub use self::spinning::SpinningQueue;
pub use self::standard::StandardQueue;

/// How a fiber's consumer waits on an empty queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStrategy {
    /// Busy-poll: lowest wake latency, burns a core while idle.
    Spinning,
    /// Mutex + condition variable.
    #[default]
    Standard,
    /// Park the consumer thread: cheapest while idle, slower to wake.
    Blocking,
}

impl QueueStrategy {
    pub fn build<T: Reject + 'static>(self) -> Arc<dyn MpscQueue<T>> {
        match self {
            QueueStrategy::Spinning => Arc::new(SpinningQueue::new()),
            QueueStrategy::Standard => Arc::new(StandardQueue::new()),
            QueueStrategy::Blocking => Arc::new(BlockingQueue::new()),
        }
    }
}
