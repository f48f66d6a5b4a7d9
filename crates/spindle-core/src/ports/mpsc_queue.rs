//! MpscQueue port - 複数 producer / 単一 consumer のキュー
//!
//! 3 つの実装（spinning / standard / blocking）の違いは
//! 「空のときに consumer がどう待つか」だけです。
//!
//! # 設計原則
//! - enqueue は producer をブロックしない
//! - close 後の enqueue は item をその場で reject（キャンセル扱いで解決）して保持しない
//! - close 前に積まれた item は consumer が取り切ってから終端（None）になる

use thiserror::Error;

use crate::domain::{CancelReason, WorkItem};

/// An item that knows how to resolve itself when a closed queue refuses it.
pub trait Reject: Send {
    fn reject(self);
}

impl Reject for WorkItem {
    fn reject(self) {
        self.cancel(CancelReason::FiberDisposed);
    }
}

/// The queue was closed; the item has already been rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue is closed")]
pub struct QueueClosed;

/// Multi-producer, single-consumer queue.
pub trait MpscQueue<T: Reject>: Send + Sync {
    /// Append an item. Never blocks.
    ///
    /// On a closed queue the item is rejected synchronously and never stored.
    fn enqueue(&self, item: T) -> Result<(), QueueClosed>;

    /// Take the next item in arrival order, waiting while empty.
    ///
    /// Returns `None` once the queue is closed and drained. Only one thread
    /// may call this.
    fn dequeue(&self) -> Option<T>;

    /// Stop accepting items and wake the consumer. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Approximate number of buffered items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
