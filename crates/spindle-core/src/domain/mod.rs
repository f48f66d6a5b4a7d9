//! Domain model (IDs, errors, operations, work items).
//!
//! - ids: FiberId / WorkItemId
//! - errors: DispatchError とキャンセル理由
//! - operation: 4 種類の payload を表す Operation
//! - work_item: WorkItem と完了ハンドル Completion

pub mod errors;
pub mod ids;
pub mod operation;
pub mod work_item;

pub use self::errors::{
    BoxError, CancelReason, ConfigError, DispatchError, FiberError, OperationCancelled,
    PayloadPanicked, find_kind,
};
pub use self::ids::{FiberId, WorkItemId};
pub use self::operation::{BoxFuture, Operation, SharedOperation};
pub use self::work_item::{Completion, Outcome, Resolution, WorkItem};
