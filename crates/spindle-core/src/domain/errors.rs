//! Errors - エラー型と分類
//!
//! 呼び出し側に届く失敗は [`DispatchError`] の 3 種類だけです。
//! - Operation: payload が失敗した（元のエラーはそのまま保持、downcast 可能）
//! - Cancelled: 実行前・待機中にキャンセルされた、または fiber が破棄済み
//! - Exhausted: リトライ上限に達した（最後の本物の失敗を保持）

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Payload から返される失敗の型。
///
/// 型を消去して保持するが、`downcast_ref` で元の型を取り出せる。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// キャンセルの理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The cancellation signal fired before the payload started, or during a
    /// retry backoff wait.
    Signalled,
    /// The payload itself reported [`OperationCancelled`].
    Cooperative,
    /// The item was submitted to (or still queued on) a disposed fiber.
    FiberDisposed,
    /// The item was dropped without ever being resolved.
    Abandoned,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancelReason::Signalled => "cancellation signalled",
            CancelReason::Cooperative => "cancelled by the operation",
            CancelReason::FiberDisposed => "fiber disposed",
            CancelReason::Abandoned => "work item abandoned",
        };
        f.write_str(s)
    }
}

/// Failure surfaced through a completion handle or a dispatcher call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload failed; the original error is kept as-is.
    #[error("operation failed: {0}")]
    Operation(#[source] BoxError),

    #[error("operation cancelled: {0}")]
    Cancelled(CancelReason),

    /// A retry policy ran out of retries. `last` is the last matched failure.
    #[error("retry policy exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: BoxError,
    },
}

impl DispatchError {
    /// Classify an error returned by a payload.
    ///
    /// [`OperationCancelled`] becomes a cancellation, anything else an
    /// operation failure.
    pub fn from_payload(error: BoxError) -> Self {
        if error.is::<OperationCancelled>() {
            DispatchError::Cancelled(CancelReason::Cooperative)
        } else {
            DispatchError::Operation(error)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled(_))
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, DispatchError::Exhausted { .. })
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            DispatchError::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }

    /// The error a retry predicate is evaluated against.
    ///
    /// For an operation failure this is the payload's own error; for an
    /// exhaustion coming out of a nested policy it is the exhaustion itself,
    /// whose source chain still leads to the real cause.
    pub fn failure(&self) -> &(dyn StdError + 'static) {
        match self {
            DispatchError::Operation(inner) => inner.as_ref(),
            other => other,
        }
    }

    /// The underlying cause: the payload error for operation failures, the
    /// last matched failure for exhaustion, `None` for cancellation.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            DispatchError::Operation(inner) => Some(inner.as_ref()),
            DispatchError::Exhausted { last, .. } => Some(last.as_ref()),
            DispatchError::Cancelled(_) => None,
        }
    }

    /// Shortcut for `cause()` followed by a downcast.
    pub fn downcast_cause<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause().and_then(|e| e.downcast_ref::<E>())
    }

    /// Unwrap into a boxed cause, keeping the payload error's identity when
    /// there is one.
    pub fn into_cause(self) -> BoxError {
        match self {
            DispatchError::Operation(inner) => inner,
            other => Box::new(other),
        }
    }
}

/// Returned by a payload to report that it stopped because it observed its
/// cancellation signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("operation observed cancellation")]
pub struct OperationCancelled;

/// A payload panicked; the panic message is kept when it was a string.
#[derive(Debug, Clone, Error)]
#[error("payload panicked: {message}")]
pub struct PayloadPanicked {
    pub message: String,
}

impl PayloadPanicked {
    pub(crate) fn from_panic(panic: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = panic.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Errors raised while building a fiber.
#[derive(Debug, Error)]
pub enum FiberError {
    #[error("failed to spawn fiber worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to build fiber runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Walk an error and its `source()` chain looking for an `E`.
///
/// Rust has no exception hierarchy; a failure "is of kind `E`" when it, or
/// anything it wraps, is an `E`.
pub fn find_kind<'a, E: StdError + 'static>(error: &'a (dyn StdError + 'static)) -> Option<&'a E> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(found) = err.downcast_ref::<E>() {
            return Some(found);
        }
        current = err.source();
    }
    None
}
