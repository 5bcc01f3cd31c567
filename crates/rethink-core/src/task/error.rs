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

use thiserror::Error;

/// Errors raised by the pool itself.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool needs at least one worker thread.
    #[error("task pool requires at least one worker thread")]
    ZeroWorkers,
    /// The pool has begun shutting down and accepts no more work.
    #[error("task pool has been shut down")]
    ShutDown,
    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// The outcome of a task that did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The task body returned an error.
    #[error("task failed: {0}")]
    Failed(String),
    /// The task body panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was still queued when the pool shut down and never ran.
    #[error("task was dropped before it could run")]
    Dropped,
}
