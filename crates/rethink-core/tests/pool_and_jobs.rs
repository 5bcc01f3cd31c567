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

//! Integration tests for the task pool and the cancellable job protocol.

use crossbeam_channel::{bounded, Receiver};
use rethink_core::event::{JobCompleted, JobProgress, JobStarted, JobStopped};
use rethink_core::job::{from_fn, ExecutionMode, JobError};
use rethink_core::task::{PoolError, TaskError};
use rethink_core::{EventBus, JobContext, JobRunner, TaskPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Occupies the only worker of `pool` until the returned sender is dropped
/// or sent to. Returns once the blocker is actually running.
fn block_worker(pool: &TaskPool) -> crossbeam_channel::Sender<()> {
    let (release_tx, release_rx) = bounded::<()>(0);
    let (running_tx, running_rx) = bounded::<()>(1);
    pool.enqueue(
        move || {
            running_tx.send(()).ok();
            release_rx.recv().ok();
            Ok(())
        },
        i32::MAX,
    )
    .unwrap();
    running_rx.recv().unwrap();
    release_tx
}

#[test]
fn test_higher_priority_task_starts_first_when_workers_are_busy() {
    let pool = TaskPool::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = block_worker(&pool);

    let o = order.clone();
    pool.enqueue(
        move || {
            o.lock().unwrap().push("low");
            Ok(())
        },
        1,
    )
    .unwrap();
    let o = order.clone();
    pool.enqueue(
        move || {
            o.lock().unwrap().push("high");
            Ok(())
        },
        5,
    )
    .unwrap();
    assert_eq!(pool.pending_task_count(), 3);

    drop(gate);
    pool.wait_all();

    assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
}

#[test]
fn test_equal_priority_runs_in_submission_order() {
    let pool = TaskPool::new(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = block_worker(&pool);

    for i in 0..5 {
        let o = order.clone();
        pool.enqueue(
            move || {
                o.lock().unwrap().push(i);
                Ok(())
            },
            2,
        )
        .unwrap();
    }
    drop(gate);
    pool.wait_all();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_shutdown_rejects_new_work_and_drops_queued_tasks() {
    let pool = Arc::new(TaskPool::new(1).unwrap());
    let gate = block_worker(&pool);
    let ran = Arc::new(AtomicUsize::new(0));

    let r = ran.clone();
    let queued = pool
        .enqueue(
            move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            0,
        )
        .unwrap();

    let closer = {
        let pool = pool.clone();
        thread::spawn(move || pool.shutdown())
    };
    while !pool.is_shut_down() {
        thread::sleep(Duration::from_millis(1));
    }

    assert!(matches!(
        pool.enqueue(|| Ok(()), 0),
        Err(PoolError::ShutDown)
    ));

    // The blocker was already running and finishes normally.
    drop(gate);
    closer.join().unwrap();

    assert_eq!(queued.wait(), Err(TaskError::Dropped));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_error_callback_receives_task_faults() {
    let pool = TaskPool::new(2).unwrap();
    let faults = Arc::new(Mutex::new(Vec::new()));
    let f = faults.clone();
    pool.set_error_callback(move |error| f.lock().unwrap().push(error.to_string()));

    for i in 0..4 {
        pool.enqueue(
            move || {
                if i % 2 == 0 {
                    anyhow::bail!("task {i} failed");
                }
                Ok(())
            },
            0,
        )
        .unwrap();
    }
    pool.wait_all();

    let mut faults = faults.lock().unwrap().clone();
    faults.sort();
    assert_eq!(
        faults,
        vec!["task failed: task 0 failed", "task failed: task 2 failed"]
    );
}

#[test]
fn test_handle_wait_timeout_and_try_take() {
    let pool = TaskPool::new(1).unwrap();
    let gate = block_worker(&pool);
    let handle = pool.enqueue(|| Ok("done"), 0).unwrap();

    assert!(handle.try_take().is_none());
    assert!(handle.wait_timeout(Duration::from_millis(10)).is_none());
    assert!(!handle.is_finished());

    drop(gate);
    assert_eq!(
        handle.wait_timeout(Duration::from_secs(5)),
        Some(Ok("done"))
    );
}

#[derive(Debug, Clone, PartialEq)]
enum Lifecycle {
    Started,
    Progress(f32),
    Completed(bool),
    Stopped,
}

fn lifecycle(bus: &EventBus) -> Receiver<Lifecycle> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let t = tx.clone();
    bus.subscribe(move |_: &JobStarted| Ok(t.send(Lifecycle::Started)?));
    let t = tx.clone();
    bus.subscribe(move |p: &JobProgress| Ok(t.send(Lifecycle::Progress(p.fraction))?));
    let t = tx.clone();
    bus.subscribe(move |c: &JobCompleted<usize>| Ok(t.send(Lifecycle::Completed(c.success))?));
    bus.subscribe(move |_: &JobStopped| Ok(tx.send(Lifecycle::Stopped)?));
    rx
}

fn counting_job(
    steps: usize,
    gate: Receiver<()>,
) -> impl rethink_core::Job<Output = usize> {
    from_fn("counting", move |ctx: &JobContext| {
        let mut done = 0;
        for step in 0..steps {
            ctx.checkpoint()?;
            gate.recv().ok();
            ctx.checkpoint()?;
            done += 1;
            ctx.report_progress((step + 1) as f32 / steps as f32);
        }
        Ok(done)
    })
}

#[test]
fn test_cancelled_job_stops_exactly_once_and_never_completes() {
    for mode in [
        ExecutionMode::Dedicated,
        ExecutionMode::Pooled { priority: 0 },
    ] {
        let bus = Arc::new(EventBus::new());
        let events = lifecycle(&bus);
        let pool = Arc::new(TaskPool::new(2).unwrap());
        let runner = JobRunner::new(bus.clone(), Some(pool), mode).unwrap();

        let (gate_tx, gate_rx) = bounded(0);
        runner.start(counting_job(10, gate_rx)).unwrap();
        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        runner.cancel();
        drop(gate_tx);
        runner.wait();

        let seen: Vec<Lifecycle> = events.try_iter().collect();
        assert_eq!(seen.first(), Some(&Lifecycle::Started), "{mode:?}");
        assert_eq!(
            seen.iter().filter(|e| **e == Lifecycle::Stopped).count(),
            1,
            "{mode:?}"
        );
        assert!(
            !seen.iter().any(|e| matches!(e, Lifecycle::Completed(_))),
            "{mode:?}"
        );
    }
}

#[test]
fn test_job_cancelled_before_it_runs_still_reports_stopped() {
    let bus = Arc::new(EventBus::new());
    let events = lifecycle(&bus);
    let pool = Arc::new(TaskPool::new(1).unwrap());
    let gate = block_worker(&pool);
    let runner = JobRunner::pooled(bus.clone(), pool.clone(), 0);

    let (_never_tx, never_rx) = bounded(0);
    runner.start(counting_job(3, never_rx)).unwrap();
    runner.cancel();
    assert!(runner.is_running());
    drop(gate);
    runner.wait();

    let seen: Vec<Lifecycle> = events.try_iter().collect();
    assert_eq!(seen, vec![Lifecycle::Started, Lifecycle::Stopped]);
}

#[test]
fn test_completed_job_reports_progress_then_result() {
    let bus = Arc::new(EventBus::new());
    let events = lifecycle(&bus);
    let runner = JobRunner::dedicated(bus.clone());

    let (gate_tx, gate_rx) = bounded(4);
    for _ in 0..4 {
        gate_tx.send(()).unwrap();
    }
    runner.start(counting_job(4, gate_rx)).unwrap();
    runner.wait();

    let seen: Vec<Lifecycle> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            Lifecycle::Started,
            Lifecycle::Progress(0.25),
            Lifecycle::Progress(0.5),
            Lifecycle::Progress(0.75),
            Lifecycle::Progress(1.0),
            Lifecycle::Completed(true),
        ]
    );
}

#[test]
fn test_dropping_runner_cancels_active_job() {
    let bus = Arc::new(EventBus::new());
    let events = lifecycle(&bus);
    let runner = JobRunner::dedicated(bus.clone());

    runner
        .start(from_fn("forever", |ctx: &JobContext| -> Result<usize, JobError> {
            loop {
                ctx.checkpoint()?;
                thread::sleep(Duration::from_millis(1));
            }
        }))
        .unwrap();
    drop(runner);

    let seen: Vec<Lifecycle> = events.try_iter().collect();
    assert_eq!(seen.last(), Some(&Lifecycle::Stopped));
}
