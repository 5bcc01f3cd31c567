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

use std::fmt;
use std::sync::Arc;

/// One side of a reversible operation.
pub type Action = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// A labelled, reversible user action.
///
/// Cloning is cheap; the closures are shared. The label is what shows up in
/// logs and in "Undo <label>" menu entries.
#[derive(Clone)]
pub struct Operation {
    label: String,
    execute: Option<Action>,
    undo: Option<Action>,
}

impl Operation {
    /// Builds a complete operation.
    pub fn new<E, U>(label: impl Into<String>, execute: E, undo: U) -> Self
    where
        E: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
        U: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            execute: Some(Arc::new(execute)),
            undo: Some(Arc::new(undo)),
        }
    }

    /// Builds an operation from optional halves. The command stack rejects
    /// operations missing either half.
    pub fn from_parts(
        label: impl Into<String>,
        execute: Option<Action>,
        undo: Option<Action>,
    ) -> Self {
        Self {
            label: label.into(),
            execute,
            undo,
        }
    }

    /// The label given at construction.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if both `execute` and `undo` are present.
    pub fn is_complete(&self) -> bool {
        self.execute.is_some() && self.undo.is_some()
    }

    pub(crate) fn apply(&self) -> anyhow::Result<()> {
        match &self.execute {
            Some(execute) => execute(),
            None => anyhow::bail!("operation '{}' has no execute action", self.label),
        }
    }

    pub(crate) fn revert(&self) -> anyhow::Result<()> {
        match &self.undo {
            Some(undo) => undo(),
            None => anyhow::bail!("operation '{}' has no undo action", self.label),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("label", &self.label)
            .field("execute", &self.execute.is_some())
            .field("undo", &self.undo.is_some())
            .finish()
    }
}
