//! ErrorMatcher - どの失敗をリトライ対象にするか
//!
//! 「型（kind）」は downcast で判定し、`source()` の連鎖もたどります。
//! ラップされたエラーも元の kind として扱われます（サブタイプ相当）。

use std::error::Error as StdError;
use std::sync::Arc;

use crate::domain::find_kind;

type Rule = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// A union of rules; a failure matches if any rule accepts it.
#[derive(Clone, Default)]
pub struct ErrorMatcher {
    rules: Vec<Rule>,
}

impl ErrorMatcher {
    pub fn all() -> Self {
        Self::predicate(|_| true)
    }

    /// Failures that are, or wrap, an `E`.
    pub fn kind<E: StdError + 'static>() -> Self {
        Self::default().or_kind::<E>()
    }

    /// Failures that are, or wrap, an `E` for which `condition` holds.
    pub fn kind_where<E, P>(condition: P) -> Self
    where
        E: StdError + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::predicate(move |error| find_kind::<E>(error).is_some_and(|e| condition(e)))
    }

    pub fn predicate<P>(predicate: P) -> Self
    where
        P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            rules: vec![Arc::new(predicate)],
        }
    }

    /// Add `E` to the accepted kinds.
    pub fn or_kind<E: StdError + 'static>(mut self) -> Self {
        self.rules.push(Arc::new(|error: &(dyn StdError + 'static)| {
            find_kind::<E>(error).is_some()
        }));
        self
    }

    pub fn matches(&self, error: &(dyn StdError + 'static)) -> bool {
        self.rules.iter().any(|rule| rule(error))
    }
}

impl std::fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMatcher")
            .field("rules", &self.rules.len())
            .finish()
    }
}
