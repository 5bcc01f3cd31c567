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

use super::context::JobContext;
use super::error::{JobError, RunnerError};
use super::token::CancellationToken;
use super::{Job, JobId};
use crate::event::{EventBus, JobCompleted, JobStarted, JobStopped};
use crate::task::{Handle, PoolError, TaskError, TaskPool};
use crate::utils::{lock, panic_message};
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

/// Where a [`JobRunner`] executes its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Each run gets its own thread.
    Dedicated,
    /// Each run is one task of the runner's [`TaskPool`].
    Pooled {
        /// Task priority of the run.
        priority: i32,
    },
}

enum Completion {
    Thread(JoinHandle<()>),
    Task {
        handle: Handle<()>,
        pool: Arc<TaskPool>,
    },
}

struct ActiveJob {
    id: JobId,
    token: CancellationToken,
    completion: Completion,
    // Set by the run itself once it is executing, so a run never joins itself.
    executing_on: Arc<OnceLock<ThreadId>>,
}

impl ActiveJob {
    fn is_finished(&self) -> bool {
        match &self.completion {
            Completion::Thread(handle) => handle.is_finished(),
            Completion::Task { handle, .. } => handle.is_finished(),
        }
    }

    fn join(self) {
        if self.executing_on.get() == Some(&thread::current().id()) {
            log::debug!("{} requested its own join; leaving it to finish.", self.id);
            return;
        }
        match self.completion {
            Completion::Thread(handle) => {
                if handle.join().is_err() {
                    log::error!("Thread of {} terminated abnormally.", self.id);
                }
            }
            Completion::Task { handle, pool } => {
                // A queued run needs a free worker, and the only one may be the caller.
                if self.executing_on.get().is_none() && pool.is_worker_thread() {
                    log::debug!(
                        "{} is still queued; not waiting for it from a worker of its pool.",
                        self.id
                    );
                    return;
                }
                match handle.wait() {
                    Ok(()) => {}
                    Err(TaskError::Dropped) => {
                        log::debug!("Task of {} was discarded before it ran.", self.id)
                    }
                    Err(e) => log::error!("Task of {} did not finish cleanly: {e}", self.id),
                }
            }
        }
    }
}

/// Announces a pooled run whose task was discarded before a worker took it.
struct PendingRun<T: Send + Sync + 'static> {
    ctx: Option<JobContext>,
    name: String,
    output: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> PendingRun<T> {
    fn new(ctx: JobContext, name: &str) -> Self {
        Self {
            ctx: Some(ctx),
            name: name.to_string(),
            output: PhantomData,
        }
    }

    /// Hands the context to the worker that is about to run the job.
    fn disarm(mut self) -> Option<JobContext> {
        self.ctx.take()
    }
}

impl<T: Send + Sync + 'static> Drop for PendingRun<T> {
    fn drop(&mut self) {
        let Some(ctx) = self.ctx.take() else {
            return;
        };
        let id = ctx.id();
        ctx.bus().publish(JobStarted {
            job: id,
            name: self.name.clone(),
        });
        if ctx.is_cancelled() {
            log::info!("{id} ('{}') stopped before it ran.", self.name);
            ctx.bus().publish(JobStopped { job: id });
        } else {
            log::warn!("{id} ('{}') was discarded by its task pool.", self.name);
            ctx.bus().publish(JobCompleted::<T>::failed(
                id,
                "the task pool shut down before the job ran",
            ));
        }
    }
}

/// Runs at most one [`Job`] at a time and reports its lifecycle on the bus.
///
/// Generators and loaders own one runner each. Dropping the runner cancels
/// and joins the active run.
pub struct JobRunner {
    bus: Arc<EventBus>,
    pool: Option<Arc<TaskPool>>,
    mode: ExecutionMode,
    active: Mutex<Option<ActiveJob>>,
}

impl JobRunner {
    /// Creates a runner. `pool` is required for [`ExecutionMode::Pooled`].
    pub fn new(
        bus: Arc<EventBus>,
        pool: Option<Arc<TaskPool>>,
        mode: ExecutionMode,
    ) -> Result<Self, RunnerError> {
        if matches!(mode, ExecutionMode::Pooled { .. }) && pool.is_none() {
            return Err(RunnerError::MissingPool);
        }
        Ok(Self {
            bus,
            pool,
            mode,
            active: Mutex::new(None),
        })
    }

    /// A runner that gives every run its own thread.
    pub fn dedicated(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            pool: None,
            mode: ExecutionMode::Dedicated,
            active: Mutex::new(None),
        }
    }

    /// A runner that submits every run to `pool` at `priority`.
    pub fn pooled(bus: Arc<EventBus>, pool: Arc<TaskPool>, priority: i32) -> Self {
        Self {
            bus,
            pool: Some(pool),
            mode: ExecutionMode::Pooled { priority },
            active: Mutex::new(None),
        }
    }

    /// The execution mode of this runner.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Starts `job`, cancelling and joining the previous run first.
    ///
    /// From a worker of the runner's own pool, a previous run that is still
    /// queued is cancelled but not waited for.
    ///
    /// ## Arguments
    /// * `job` - The computation to run in this runner's execution mode.
    ///
    /// ## Returns
    /// The id the lifecycle events of the new run will carry.
    pub fn start<J: Job>(&self, job: J) -> Result<JobId, RunnerError> {
        // Joined outside the lock: the previous run may be publishing to
        // handlers that query this runner.
        let previous = lock(&self.active).take();
        if let Some(previous) = previous {
            log::debug!("Cancelling {} before starting a new run.", previous.id);
            previous.token.cancel();
            previous.join();
        }

        let id = JobId::next();
        let token = CancellationToken::new();
        let executing_on = Arc::new(OnceLock::new());
        let completion = self.launch(id, token.clone(), Arc::clone(&executing_on), job)?;

        let displaced = lock(&self.active).replace(ActiveJob {
            id,
            token,
            completion,
            executing_on,
        });
        // Another thread started a run concurrently; keep only ours.
        if let Some(displaced) = displaced {
            displaced.token.cancel();
            displaced.join();
        }
        Ok(id)
    }

    fn launch<J: Job>(
        &self,
        id: JobId,
        token: CancellationToken,
        executing_on: Arc<OnceLock<ThreadId>>,
        job: J,
    ) -> Result<Completion, RunnerError> {
        let ctx = JobContext::new(id, token, Arc::clone(&self.bus));
        match (self.mode, &self.pool) {
            (ExecutionMode::Dedicated, _) => {
                let handle = thread::Builder::new()
                    .name(format!("rethink-{id}"))
                    .spawn(move || {
                        let _ = executing_on.set(thread::current().id());
                        execute(job, ctx);
                    })?;
                Ok(Completion::Thread(handle))
            }
            (ExecutionMode::Pooled { priority }, Some(pool)) => {
                if pool.is_shut_down() {
                    return Err(PoolError::ShutDown.into());
                }
                let pending = PendingRun::<J::Output>::new(ctx, job.name());
                let handle = pool.enqueue(
                    move || {
                        if let Some(ctx) = pending.disarm() {
                            let _ = executing_on.set(thread::current().id());
                            execute(job, ctx);
                        }
                        Ok(())
                    },
                    priority,
                )?;
                Ok(Completion::Task {
                    handle,
                    pool: Arc::clone(pool),
                })
            }
            (ExecutionMode::Pooled { .. }, None) => Err(RunnerError::MissingPool),
        }
    }

    /// Requests cancellation of the active run, if any. Does not wait.
    pub fn cancel(&self) {
        if let Some(active) = lock(&self.active).as_ref() {
            log::debug!("Cancellation requested for {}.", active.id);
            active.token.cancel();
        }
    }

    /// Blocks until the active run, if any, has published its final event.
    pub fn wait(&self) {
        let active = lock(&self.active).take();
        if let Some(active) = active {
            active.join();
        }
    }

    /// Returns `true` while a run is executing (or queued in the pool).
    pub fn is_running(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|active| !active.is_finished())
    }

    /// The id of the most recent run that has not been waited on.
    pub fn current_job(&self) -> Option<JobId> {
        lock(&self.active).as_ref().map(|active| active.id)
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.cancel();
        self.wait();
    }
}

/// Runs `job` to its end and publishes the matching lifecycle events.
fn execute<J: Job>(job: J, ctx: JobContext) {
    let name = job.name().to_string();
    let id = ctx.id();
    log::debug!("{id} ('{name}') started.");
    ctx.bus().publish(JobStarted {
        job: id,
        name: name.clone(),
    });

    let outcome = match catch_unwind(AssertUnwindSafe(|| job.run(&ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(JobError::Failed(anyhow::anyhow!(
            "job panicked: {}",
            panic_message(&*payload)
        ))),
    };

    // A cancellation that lands after the last checkpoint still wins: a
    // cancelled run never announces completion.
    if ctx.is_cancelled() || matches!(outcome, Err(JobError::Cancelled)) {
        log::info!("{id} ('{name}') stopped.");
        ctx.bus().publish(JobStopped { job: id });
        return;
    }

    match outcome {
        Ok(payload) => {
            log::debug!("{id} ('{name}') completed.");
            ctx.bus().publish(JobCompleted::succeeded(id, payload));
        }
        Err(e) => {
            let message = format!("{e:#}");
            log::warn!("{id} ('{name}') failed: {message}");
            ctx.bus()
                .publish(JobCompleted::<J::Output>::failed(id, message));
        }
    }
}
