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

use crossbeam_channel::{unbounded, Receiver};
use rethink_core::event::{JobCompleted, JobProgress, JobStarted, JobStopped};
use rethink_core::{EventBus, JobId, TaskPool};
use rethink_procedural::{
    GeneratedModel, GenerationCancelRequested, GenerationRequested, GeneratorHub,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum Seen {
    Started(JobId, String),
    Progress(JobId, f32),
    Completed(JobCompleted<GeneratedModel>),
    Stopped(JobId),
}

fn watch(bus: &EventBus) -> Receiver<Seen> {
    let (tx, rx) = unbounded();
    let t = tx.clone();
    bus.subscribe(move |e: &JobStarted| {
        let _ = t.send(Seen::Started(e.job, e.name.clone()));
        Ok(())
    });
    let t = tx.clone();
    bus.subscribe(move |e: &JobProgress| {
        let _ = t.send(Seen::Progress(e.job, e.fraction));
        Ok(())
    });
    let t = tx.clone();
    bus.subscribe(move |e: &JobCompleted<GeneratedModel>| {
        let _ = t.send(Seen::Completed(e.clone()));
        Ok(())
    });
    bus.subscribe(move |e: &JobStopped| {
        let _ = tx.send(Seen::Stopped(e.job));
        Ok(())
    });
    rx
}

/// Collects events for `job` until it completes or stops.
fn finish(rx: &Receiver<Seen>, job: JobId) -> Vec<Seen> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv_timeout(TIMEOUT).expect("job did not finish in time");
        let done = match &event {
            Seen::Completed(e) => e.job == job,
            Seen::Stopped(id) => *id == job,
            _ => false,
        };
        events.push(event);
        if done {
            return events;
        }
    }
}

fn setup() -> (Arc<EventBus>, GeneratorHub, Receiver<Seen>) {
    let bus = Arc::new(EventBus::new());
    let pool = Arc::new(TaskPool::new(2).unwrap());
    let rx = watch(&bus);
    let hub = GeneratorHub::with_defaults(bus.clone(), pool, 0);
    (bus, hub, rx)
}

#[test]
fn test_lsystem_request_produces_a_tree() {
    let (_bus, hub, rx) = setup();

    let job = hub
        .request("lsystem", json!({ "iterations": 3 }))
        .expect("lsystem is registered");
    let events = finish(&rx, job);

    assert!(matches!(&events[0], Seen::Started(id, name) if *id == job && name == "lsystem"));
    let progress: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            Seen::Progress(_, f) => Some(*f),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let Some(Seen::Completed(done)) = events.last() else {
        panic!("expected completion, got {events:?}");
    };
    assert!(done.success);
    let model = done.payload.as_ref().unwrap();
    assert_eq!(model.algorithm, "lsystem");
    assert_eq!(model.indices.len(), 7 * 2);
}

#[test]
fn test_wfc_request_over_the_bus_fills_the_grid() {
    let (bus, _hub, rx) = setup();

    bus.publish(GenerationRequested {
        algorithm: "wfc".into(),
        params: json!({
            "tileSet": ["floor", "wall"],
            "width": 2, "height": 2, "depth": 2,
            "adjacencyRules": { "floor": ["wall"], "wall": ["floor"] },
            "seed": 3
        }),
    });

    let Ok(Seen::Started(job, name)) = rx.recv_timeout(TIMEOUT) else {
        panic!("expected the run to start");
    };
    assert_eq!(name, "wfc");
    let events = finish(&rx, job);

    let Some(Seen::Completed(done)) = events.last() else {
        panic!("expected completion, got {events:?}");
    };
    assert!(done.success, "{:?}", done.error);
    let model = done.payload.as_ref().unwrap();
    assert_eq!(model.tiles.len(), 8);
    let walls = model.tiles.iter().filter(|t| t.tile == "wall").count();
    assert_eq!(walls, 4);
}

#[test]
fn test_wfc_with_no_tiles_fails_without_payload() {
    let (_bus, hub, rx) = setup();

    let job = hub.request("wfc", json!({})).unwrap();
    let events = finish(&rx, job);

    let Some(Seen::Completed(done)) = events.last() else {
        panic!("expected completion, got {events:?}");
    };
    assert!(!done.success);
    assert!(done.payload.is_none());
    assert!(done.error.as_deref().unwrap_or_default().contains("tile set is empty"));
}

#[test]
fn test_cancel_request_stops_a_running_generation() {
    let (bus, hub, rx) = setup();

    // Cancel from the first progress report, while the run is mid-grid.
    let requested = Arc::new(AtomicBool::new(false));
    let canceller = Arc::downgrade(&bus);
    let once = requested.clone();
    bus.subscribe(move |_: &JobProgress| {
        if let Some(bus) = canceller.upgrade() {
            if !once.swap(true, Ordering::SeqCst) {
                bus.publish(GenerationCancelRequested::default());
            }
        }
        Ok(())
    });

    let job = hub
        .request(
            "wfc",
            json!({
                "tileSet": ["a", "b", "c", "d", "e", "f", "g", "h"],
                "width": 40, "height": 40, "depth": 40,
                "seed": 11
            }),
        )
        .unwrap();

    let events = finish(&rx, job);
    assert!(requested.load(Ordering::SeqCst));
    assert!(matches!(events.last(), Some(Seen::Stopped(id)) if *id == job));
    assert!(!events.iter().any(|e| matches!(e, Seen::Completed(_))));
    let progress = events
        .iter()
        .filter(|e| matches!(e, Seen::Progress(..)))
        .count();
    assert_eq!(progress, 1);

    // The task winds down just after announcing the stop.
    let deadline = Instant::now() + TIMEOUT;
    while hub.is_running() {
        assert!(Instant::now() < deadline, "generator still running");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_unknown_algorithm_fails_without_starting_anything() {
    let (bus, _hub, rx) = setup();

    bus.publish(GenerationRequested {
        algorithm: "voronoi".into(),
        params: json!(null),
    });

    match rx.recv_timeout(TIMEOUT) {
        Ok(Seen::Completed(done)) => {
            assert!(!done.success);
            assert_eq!(done.error.as_deref(), Some("unknown algorithm 'voronoi'"));
        }
        other => panic!("expected a failed completion, got {other:?}"),
    }
}
