//! Domain identifiers (strongly-typed IDs).
//!
//! Fiber と WorkItem は ULID ベースの ID で識別します。
//! ログのフィールドやワーカースレッド名に使うだけなので、
//! 生成はどこからでも調整なしに行えることが重要です。
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` はマーカー型（PhantomData）としてコンパイル時の型安全性だけを提供します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"fiber-", "item-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let fiber_id = FiberId::generate();
/// let item_id = WorkItemId::generate();
/// // fiber_id と item_id は異なる型なので、混同できない
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 現在時刻ベースの新しい Id を生成
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    /// スレッド名などに使う短い表記（ULID のランダム部の末尾 6 文字）
    pub fn short(&self) -> String {
        let s = self.ulid.to_string();
        format!("{}{}", T::prefix(), &s[s.len() - 6..])
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Fiber のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fiber {}

impl IdMarker for Fiber {
    fn prefix() -> &'static str {
        "fiber-"
    }
}

/// WorkItem のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkItem {}

impl IdMarker for WorkItem {
    fn prefix() -> &'static str {
        "item-"
    }
}

/// Identifier of a fiber (one dedicated worker thread + queue).
pub type FiberId = Id<Fiber>;

/// Identifier of a single submitted work item.
pub type WorkItemId = Id<WorkItem>;
