//! spindle-core
//!
//! Fibers, MPSC queues, dispatchers and retry policies.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, errors, operation, work_item）
//! - **ports**: 抽象化レイヤー（Dispatcher, MpscQueue）
//! - **impls**: 実装（3 種類の queue, InlineDispatcher）
//! - **fiber**: 専用スレッドで順番に実行する Fiber
//! - **retry**: 任意の Dispatcher を包む RetryPolicy
//! - **actor**: 状態を fiber に閉じ込める Actor
//! - **runtime**: tokio runtime のヘルパー

pub mod actor;
pub mod domain;
pub mod fiber;
pub mod impls;
pub mod ports;
pub mod retry;
pub mod runtime;

pub use crate::actor::Actor;
pub use crate::domain::{
    BoxError, CancelReason, Completion, DispatchError, FiberError, Operation, OperationCancelled,
};
pub use crate::fiber::{Fiber, FiberBuilder, FiberConfig, FiberState};
pub use crate::impls::{InlineDispatcher, QueueStrategy};
pub use crate::ports::Dispatcher;
pub use crate::retry::{RetryPolicy, RetrySettings};
