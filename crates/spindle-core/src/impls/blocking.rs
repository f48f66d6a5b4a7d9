//! BlockingQueue - 空のときは consumer スレッドを park するキュー
//!
//! `thread::park` は Linux では futex で待つので、アイドル中のコストは最小。
//! そのかわり起床には unpark のシステムコール分の遅延がある。
//!
//! Lost wakeup を防ぐ順序:
//! 1. consumer: `parked = true` → もう一度 pop / sealed を確認 → park
//! 2. producer: push → admission を解放 → `parked` を見て unpark
//!
//! どちらの順で交差しても、consumer が再確認で item を見つけるか、producer が unpark する。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

use crossbeam_queue::SegQueue;

use super::gate::CloseGate;
use crate::ports::{MpscQueue, QueueClosed, Reject};

pub struct BlockingQueue<T: Reject> {
    items: SegQueue<T>,
    gate: CloseGate,
    consumer: OnceLock<Thread>,
    parked: AtomicBool,
}

impl<T: Reject> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
            gate: CloseGate::default(),
            consumer: OnceLock::new(),
            parked: AtomicBool::new(false),
        }
    }

    fn wake_if_parked(&self) {
        if self.parked.load(Ordering::SeqCst)
            && let Some(consumer) = self.consumer.get()
        {
            consumer.unpark();
        }
    }

    fn take_or_finish(&self) -> Option<Option<T>> {
        if let Some(item) = self.items.pop() {
            return Some(Some(item));
        }
        if self.gate.is_sealed() {
            return Some(self.items.pop());
        }
        None
    }
}

impl<T: Reject> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reject> MpscQueue<T> for BlockingQueue<T> {
    fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        match self.gate.admit() {
            Some(admission) => {
                self.items.push(item);
                drop(admission);
                self.wake_if_parked();
                Ok(())
            }
            None => {
                // close 済み: consumer が sealed 待ちで park している可能性があるので起こす
                self.wake_if_parked();
                item.reject();
                Err(QueueClosed)
            }
        }
    }

    fn dequeue(&self) -> Option<T> {
        self.consumer.get_or_init(thread::current);
        loop {
            if let Some(next) = self.take_or_finish() {
                return next;
            }

            self.parked.store(true, Ordering::SeqCst);
            if let Some(next) = self.take_or_finish() {
                self.parked.store(false, Ordering::SeqCst);
                return next;
            }
            thread::park();
            self.parked.store(false, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        self.gate.close();
        if let Some(consumer) = self.consumer.get() {
            consumer.unpark();
        }
    }

    fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T: Reject> Drop for BlockingQueue<T> {
    fn drop(&mut self) {
        while let Some(item) = self.items.pop() {
            item.reject();
        }
    }
}
