//! RetrySettings - 設定ファイルから読み込むリトライ設定

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::RetryPolicy;
use super::wait::WaitStrategy;
use crate::domain::ConfigError;

/// Serializable form of a match-all retry policy.
///
/// `wait_ms` empty: retry immediately. One entry: fixed wait. More: a
/// sequence whose last entry repeats. `max_retries` absent: retry forever.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub wait_ms: Vec<u64>,
    pub max_retries: Option<u32>,
}

impl RetrySettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_policy(self) -> RetryPolicy {
        let wait = match self.wait_ms.as_slice() {
            [] => WaitStrategy::None,
            [only] => WaitStrategy::Fixed(Duration::from_millis(*only)),
            many => WaitStrategy::sequence(many.iter().copied().map(Duration::from_millis)),
        };
        let builder = RetryPolicy::match_all().with_wait_strategy(wait);
        match self.max_retries {
            Some(n) => builder.with_max_retries(n),
            None => builder.forever(),
        }
    }
}
