//! StandardQueue - Mutex + Condvar で待つキュー
//!
//! # 学習ポイント
//! - Mutex + Condvar による blocking pop
//! - ロックは push/pop の間だけ保持し、reject（完了ハンドルの解決）はロック外で行う

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::ports::{MpscQueue, QueueClosed, Reject};

struct StandardState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct StandardQueue<T: Reject> {
    state: Mutex<StandardState<T>>,
    condvar: Condvar,
}

impl<T: Reject> StandardQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StandardState {
                items: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }
}

impl<T: Reject> Default for StandardQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reject> MpscQueue<T> for StandardQueue<T> {
    fn enqueue(&self, item: T) -> Result<(), QueueClosed> {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            item.reject();
            return Err(QueueClosed);
        }
        state.items.push_back(item);
        drop(state);

        // 待機中の consumer に通知
        self.condvar.notify_one();
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.condvar.wait(&mut state);
        }
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.condvar.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

impl<T: Reject> Drop for StandardQueue<T> {
    fn drop(&mut self) {
        for item in self.state.get_mut().items.drain(..) {
            item.reject();
        }
    }
}
