//! Retry - 失敗した operation を再試行するデコレータ
//!
//! - matcher: どの失敗をリトライするか（kind / 条件付き kind / 任意の述語 / 全部）
//! - wait: 次の試行までの待ち時間（なし / 固定 / 列 / 関数）
//! - builder: matcher → wait → 上限 の順に組み立てる
//! - policy: RetryPolicy 本体（Dispatcher を実装）
//! - config: serde で読み込める RetrySettings

mod builder;
mod config;
mod matcher;
mod policy;
mod wait;

pub use self::builder::RetryPolicyBuilder;
pub use self::config::RetrySettings;
pub use self::matcher::ErrorMatcher;
pub use self::policy::RetryPolicy;
pub use self::wait::WaitStrategy;
