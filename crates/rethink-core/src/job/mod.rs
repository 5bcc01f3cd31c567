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

//! The cancellable job protocol shared by every long-running producer.
//!
//! A [`Job`] is a one-shot computation that runs on its own thread or as one
//! task of a [`TaskPool`](crate::task::TaskPool). Its [`JobRunner`] reports the
//! lifecycle on the bus:
//!
//! 1. [`JobStarted`](crate::event::JobStarted) when the body begins,
//! 2. any number of [`JobProgress`](crate::event::JobProgress) reports,
//! 3. exactly one of [`JobCompleted`](crate::event::JobCompleted) (success or
//!    failure) or [`JobStopped`](crate::event::JobStopped) (cancelled).
//!
//! Cancellation is cooperative: the body polls its [`CancellationToken`] at
//! checkpoints of its own choosing. A runner keeps at most one job alive;
//! starting another cancels and joins the previous run first.

mod context;
mod error;
mod runner;
mod token;

pub use self::context::JobContext;
pub use self::error::{JobError, RunnerError};
pub use self::runner::{ExecutionMode, JobRunner};
pub use self::token::CancellationToken;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one run of a job. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Allocates a fresh id.
    ///
    /// Runners call this for every start. Callers that must report on a job
    /// that never ran (a rejected request, say) can allocate one as well.
    pub fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value of this id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// A long-running, cancellable computation.
pub trait Job: Send + 'static {
    /// The data announced in [`JobCompleted`](crate::event::JobCompleted) on success.
    type Output: Send + Sync + 'static;

    /// Human-readable name, used in [`JobStarted`](crate::event::JobStarted) and logs.
    fn name(&self) -> &str;

    /// Runs the computation, polling `ctx` at checkpoints.
    ///
    /// Return [`JobError::Cancelled`] (usually through `ctx.checkpoint()?`) to
    /// stop early.
    fn run(self, ctx: &JobContext) -> Result<Self::Output, JobError>;
}

/// A [`Job`] built from a closure. See [`from_fn`].
pub struct FnJob<F> {
    name: String,
    body: F,
}

/// Wraps a closure as a [`Job`].
pub fn from_fn<T, F>(name: impl Into<String>, body: F) -> FnJob<F>
where
    T: Send + Sync + 'static,
    F: FnOnce(&JobContext) -> Result<T, JobError> + Send + 'static,
{
    FnJob {
        name: name.into(),
        body,
    }
}

impl<T, F> Job for FnJob<F>
where
    T: Send + Sync + 'static,
    F: FnOnce(&JobContext) -> Result<T, JobError> + Send + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn run(self, ctx: &JobContext) -> Result<T, JobError> {
        (self.body)(ctx)
    }
}
