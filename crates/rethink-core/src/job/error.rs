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

use crate::task::PoolError;
use thiserror::Error;

/// How a job body ends without producing its output.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job observed its cancellation token and stopped.
    #[error("job was cancelled")]
    Cancelled,
    /// The job failed; the message ends up in `JobCompleted::error`.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Errors raised while setting up or launching a job run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A pooled runner was built without a task pool.
    #[error("pooled job runner requires a task pool")]
    MissingPool,
    /// The dedicated job thread could not be spawned.
    #[error("failed to spawn job thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The task pool refused the job.
    #[error(transparent)]
    Pool(#[from] PoolError),
}
