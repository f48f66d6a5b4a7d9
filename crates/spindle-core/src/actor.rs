//! Actor - 状態を 1 つの fiber に閉じ込める型付きアダプタ
//!
//! 状態 `S` に触れるのは fiber のスレッドだけです。呼び出し側は
//! `ask` / `tell` で closure を送り、fiber 上で順番に `&mut S` が渡されます。
//! ロックはあるが、取るのは常に同じ 1 スレッドなので競合しません。

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{BoxError, Completion, FiberError, Operation};
use crate::fiber::{Fiber, FiberBuilder};

pub struct Actor<S> {
    fiber: Fiber,
    state: Arc<Mutex<S>>,
}

impl<S: Send + 'static> Actor<S> {
    pub fn spawn(state: S) -> Result<Self, FiberError> {
        Self::spawn_with(state, FiberBuilder::new())
    }

    pub fn spawn_with(state: S, builder: FiberBuilder) -> Result<Self, FiberError> {
        Ok(Self {
            fiber: builder.build()?,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Run `f` against the state on the actor's fiber and get its result.
    pub fn ask<R, F>(&self, f: F) -> Completion<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let mut f = Some(f);
        self.fiber.submit(Operation::func(move || -> Result<R, BoxError> {
            let f = f.take().ok_or("actor message delivered twice")?;
            Ok(f(&mut state.lock()))
        }))
    }

    /// Like [`Actor::ask`] without waiting for a result.
    pub fn tell<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        drop(self.ask(f));
    }

    pub fn fiber(&self) -> &Fiber {
        &self.fiber
    }

    /// Dispose the fiber; pending messages resolve as cancelled.
    pub fn stop(&self) {
        self.fiber.dispose();
    }
}

impl<S> Clone for Actor<S> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber.clone(),
            state: Arc::clone(&self.state),
        }
    }
}
