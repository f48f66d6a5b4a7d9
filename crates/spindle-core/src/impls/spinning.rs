//! SpinningQueue - 空のときは busy-poll で待つキュー
//!
//! レイテンシは最小だが、アイドル中も CPU を使い続ける。
//! 一定回数 spin したら `yield_now` に切り替えて他スレッドに譲る。

use std::hint;
use std::thread;

use crossbeam_queue::SegQueue;

use super::gate::CloseGate;
use crate::ports::{MpscQueue, QueueClosed, Reject};

const SPINS_BEFORE_YIELD: u32 = 128;

pub struct SpinningQueue<T: Reject> {
    items: SegQueue<T>,
    gate: CloseGate,
}

impl<T: Reject> SpinningQueue<T> {
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
            gate: CloseGate::default(),
        }
    }
}

impl<T: Reject> Default for SpinningQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reject> MpscQueue<T> for SpinningQueue<T> {
    fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        let Some(_admission) = self.gate.admit() else {
            item.reject();
            return Err(QueueClosed);
        };
        self.items.push(item);
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        let mut spins = 0u32;
        loop {
            if let Some(item) = self.items.pop() {
                return Some(item);
            }
            if self.gate.is_sealed() {
                return self.items.pop();
            }
            if spins < SPINS_BEFORE_YIELD {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    fn close(&self) {
        self.gate.close();
    }

    fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T: Reject> Drop for SpinningQueue<T> {
    fn drop(&mut self) {
        while let Some(item) = self.items.pop() {
            item.reject();
        }
    }
}
