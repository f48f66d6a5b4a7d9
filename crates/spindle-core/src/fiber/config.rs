//! FiberConfig - fiber のシリアライズ可能な設定
//!
//! JSON などから読み込み、[`FiberBuilder`](super::FiberBuilder) に渡します。

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::impls::QueueStrategy;

/// Worker thread options for a fiber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiberConfig {
    /// Worker thread name. Defaults to the fiber id's short form.
    pub name: Option<String>,
    /// Worker stack size in bytes. `None` uses the std default.
    pub stack_size: Option<usize>,
    pub queue: QueueStrategy,
    /// `true`: dropping the last handle disposes and joins the worker
    /// (foreground). `false`: the queue is closed and the worker is left to
    /// drain on its own (background).
    pub join_on_drop: bool,
}

impl Default for FiberConfig {
    fn default() -> Self {
        Self {
            name: None,
            stack_size: None,
            queue: QueueStrategy::default(),
            join_on_drop: true,
        }
    }
}

impl FiberConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values `std::thread::Builder` would panic on or that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            if name.contains('\0') {
                return Err(ConfigError::Invalid(
                    "fiber name must not contain NUL bytes".to_string(),
                ));
            }
        }
        if self.stack_size == Some(0) {
            return Err(ConfigError::Invalid(
                "stack_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
