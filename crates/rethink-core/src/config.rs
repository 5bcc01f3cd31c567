// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration of the coordination layer, stored as RON.
//!
//! ```ron
//! (
//!     task_pool: (worker_count: Some(4), thread_name: "rethink-worker"),
//!     history: (max_depth: Some(256)),
//!     log_level: "debug",
//! )
//! ```
//!
//! Every field has a default, so an empty `()` document is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or saving a [`CoreConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config I/O error for '{path}': {source}")]
    Io {
        /// The offending path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The document is not valid RON for this schema.
    #[error("invalid config: {0}")]
    Parse(String),
    /// The config could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// Settings for [`TaskPool::from_config`](crate::task::TaskPool::from_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPoolConfig {
    /// Number of worker threads. `None` uses the available hardware parallelism.
    pub worker_count: Option<usize>,
    /// Prefix of the worker thread names; the worker index is appended.
    pub thread_name: String,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            thread_name: "rethink-worker".to_string(),
        }
    }
}

/// Settings for [`CommandStack::with_config`](crate::command::CommandStack::with_config).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of undoable operations kept. When exceeded the oldest
    /// entry is forgotten. `None` keeps everything.
    pub max_depth: Option<usize>,
}

/// Top-level configuration of the coordination layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Worker pool settings.
    pub task_pool: TaskPoolConfig,
    /// Undo/redo history settings.
    pub history: HistoryConfig,
    /// Default log filter used by binaries when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            task_pool: TaskPoolConfig::default(),
            history: HistoryConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Parses a RON document.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses the RON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_ron_str(&source)?;
        log::debug!("Loaded core config from '{}'.", path.display());
        Ok(config)
    }

    /// Serializes to pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Writes this config to `path` as RON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = self.to_ron_string()?;
        std::fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
