//! Ports - 抽象化レイヤー
//!
//! 実行エンジンの継ぎ目になる trait を定義します。
//! - Dispatcher: 仕事の投入口（Fiber / InlineDispatcher / RetryPolicy が実装）
//! - MpscQueue: Fiber が使うキュー（3 つの待ち方の実装を差し替え可能）

pub mod dispatcher;
pub mod mpsc_queue;

pub use self::dispatcher::Dispatcher;
pub use self::mpsc_queue::{MpscQueue, QueueClosed, Reject};
