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

use super::error::{PoolError, TaskError};
use super::handle::Handle;
use crate::config::TaskPoolConfig;
use crate::utils::{lock, panic_message};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

/// Receives the error of every task that failed or panicked.
pub type ErrorCallback = Arc<dyn Fn(&TaskError) + Send + Sync>;

type TaskBody = Box<dyn FnOnce() -> Result<(), TaskError> + Send>;

struct QueuedTask {
    priority: i32,
    sequence: u64,
    body: TaskBody,
}

// Max-heap order: higher priority first, then earlier submission first.
impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

#[derive(Default)]
struct PoolState {
    queue: BinaryHeap<QueuedTask>,
    active: usize,
    next_sequence: u64,
    stopping: bool,
    error_callback: Option<ErrorCallback>,
}

impl PoolState {
    fn is_idle(&self) -> bool {
        (self.queue.is_empty() || self.stopping) && self.active == 0
    }
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signalled when work is queued or the pool stops.
    work_available: Condvar,
    /// Signalled when a task finishes or the pool stops.
    idle: Condvar,
}

impl Shared {
    fn wait<'a>(
        condvar: &Condvar,
        guard: MutexGuard<'a, PoolState>,
    ) -> MutexGuard<'a, PoolState> {
        condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed pool of worker threads draining a max-priority queue.
///
/// A steady stream of high-priority tasks can starve low-priority ones; the
/// queue makes no attempt at aging.
///
/// Dropping the pool shuts it down: workers finish the task they are running,
/// tasks still queued are discarded (their handles report
/// [`TaskError::Dropped`]) and every worker is joined.
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Mutex<Vec<ThreadId>>,
    worker_count: usize,
}

impl TaskPool {
    /// Creates a pool with `worker_count` threads.
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        Self::spawn(worker_count, "rethink-worker", None)
    }

    /// Creates a pool with one worker per available hardware thread.
    pub fn with_available_parallelism() -> Result<Self, PoolError> {
        Self::new(available_parallelism())
    }

    /// Creates a pool whose task failures are forwarded to `callback`.
    pub fn with_error_callback(
        worker_count: usize,
        callback: impl Fn(&TaskError) + Send + Sync + 'static,
    ) -> Result<Self, PoolError> {
        Self::spawn(worker_count, "rethink-worker", Some(Arc::new(callback)))
    }

    /// Creates a pool from its configuration section.
    pub fn from_config(config: &TaskPoolConfig) -> Result<Self, PoolError> {
        let worker_count = config.worker_count.unwrap_or_else(available_parallelism);
        Self::spawn(worker_count, &config.thread_name, None)
    }

    fn spawn(
        worker_count: usize,
        thread_name: &str,
        error_callback: Option<ErrorCallback>,
    ) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::ZeroWorkers);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                error_callback,
                ..PoolState::default()
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            worker_ids: Mutex::new(Vec::with_capacity(worker_count)),
            worker_count,
        };

        for index in 0..worker_count {
            let shared = Arc::clone(&pool.shared);
            let spawned = thread::Builder::new()
                .name(format!("{thread_name}-{index}"))
                .spawn(move || worker_loop(shared, index));
            match spawned {
                Ok(handle) => {
                    lock(&pool.worker_ids).push(handle.thread().id());
                    lock(&pool.workers).push(handle);
                }
                // Dropping the partially built pool joins the workers already running.
                Err(e) => return Err(PoolError::Spawn(e)),
            }
        }

        log::info!("TaskPool started with {worker_count} worker(s).");
        Ok(pool)
    }

    /// Number of worker threads the pool was built with.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Queues `body` at `priority` (higher runs first).
    ///
    /// ## Arguments
    /// * `body` - The work to run on a worker. Its error or panic is reported
    ///   through the handle and the error callback.
    /// * `priority` - Tasks with a higher value are dequeued first; equal
    ///   priorities run in submission order.
    ///
    /// ## Returns
    /// A [`Handle`] resolving to the task's result, or [`PoolError::ShutDown`]
    /// once shutdown has begun.
    pub fn enqueue<R, F>(&self, body: F, priority: i32) -> Result<Handle<R>, PoolError>
    where
        R: Send + 'static,
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
    {
        let (sender, receiver) = flume::bounded(1);
        let task: TaskBody = Box::new(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::Failed(format!("{e:#}"))),
                Err(payload) => Err(TaskError::Panicked(panic_message(&*payload))),
            };
            let report = outcome.as_ref().err().cloned();
            // The caller may have dropped its handle; the result is simply discarded.
            let _ = sender.send(outcome);
            report.map_or(Ok(()), Err)
        });

        {
            let mut state = lock(&self.shared.state);
            if state.stopping {
                return Err(PoolError::ShutDown);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.queue.push(QueuedTask {
                priority,
                sequence,
                body: task,
            });
        }
        self.shared.work_available.notify_one();

        Ok(Handle::new(receiver))
    }

    /// Blocks until the queue is empty and no task is executing.
    ///
    /// Must not be called from inside a task of the same pool: the calling task
    /// counts as executing, so the wait would never end.
    pub fn wait_all(&self) {
        let mut state = lock(&self.shared.state);
        while !state.is_idle() {
            state = Shared::wait(&self.shared.idle, state);
        }
    }

    /// Installs (or replaces) the callback receiving task failures.
    pub fn set_error_callback(&self, callback: impl Fn(&TaskError) + Send + Sync + 'static) {
        lock(&self.shared.state).error_callback = Some(Arc::new(callback));
    }

    /// Number of tasks queued or currently executing.
    pub fn pending_task_count(&self) -> usize {
        let state = lock(&self.shared.state);
        state.queue.len() + state.active
    }

    /// Returns `true` if the calling thread is one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        lock(&self.worker_ids).contains(&current)
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shut_down(&self) -> bool {
        lock(&self.shared.state).stopping
    }

    /// Stops accepting work, discards queued tasks and joins every worker.
    ///
    /// Tasks already executing run to completion. Calling this more than once
    /// is harmless.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = lock(&self.shared.state);
            state.stopping = true;
            std::mem::take(&mut state.queue)
        };
        self.shared.work_available.notify_all();
        self.shared.idle.notify_all();

        if !dropped.is_empty() {
            log::warn!(
                "TaskPool shutting down with {} queued task(s); they will not run.",
                dropped.len()
            );
        }
        // Disconnects the handles of the discarded tasks.
        drop(dropped);

        let workers = std::mem::take(&mut *lock(&self.workers));
        if workers.is_empty() {
            return;
        }
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                // Shut down from inside one of our own tasks; this worker exits
                // on its own once the task returns.
                continue;
            }
            if worker.join().is_err() {
                log::error!("A TaskPool worker terminated abnormally.");
            }
        }
        log::info!("TaskPool stopped.");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("TaskPool")
            .field("worker_count", &self.worker_count)
            .field("queued", &state.queue.len())
            .field("active", &state.active)
            .field("stopping", &state.stopping)
            .finish()
    }
}

fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    log::trace!("TaskPool worker {index} started.");
    loop {
        let task = {
            let mut state = lock(&shared.state);
            while state.queue.is_empty() && !state.stopping {
                state = Shared::wait(&shared.work_available, state);
            }
            if state.stopping {
                break;
            }
            let Some(task) = state.queue.pop() else {
                continue;
            };
            state.active += 1;
            task
        };

        if let Err(error) = (task.body)() {
            let callback = lock(&shared.state).error_callback.clone();
            match callback {
                Some(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(&error))).is_err() {
                        log::error!("TaskPool error callback panicked while reporting: {error}");
                    }
                }
                None => log::error!("TaskPool worker {index}: {error}"),
            }
        }

        lock(&shared.state).active -= 1;
        shared.idle.notify_all();
    }
    log::trace!("TaskPool worker {index} exiting.");
}
