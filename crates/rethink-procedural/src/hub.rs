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

use crate::{
    GeneratedModel, GenerationCancelRequested, GenerationRequested, LSystemGenerator,
    ProceduralGenerator, WfcGenerator,
};
use rethink_core::event::JobCompleted;
use rethink_core::{EventBus, JobId, SubscriptionId, TaskPool};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

type Registry = RwLock<HashMap<String, Arc<dyn ProceduralGenerator>>>;

/// Routes generation requests from the bus to registered generators.
///
/// The hub subscribes to [`GenerationRequested`] and
/// [`GenerationCancelRequested`] on construction and unsubscribes when
/// dropped. A request for an unknown algorithm is answered with a failed
/// [`JobCompleted<GeneratedModel>`] under a fresh [`JobId`].
pub struct GeneratorHub {
    generators: Arc<Registry>,
    bus: Arc<EventBus>,
    subscriptions: Vec<(TypeId, SubscriptionId)>,
}

impl GeneratorHub {
    /// Creates a hub with no generators.
    pub fn new(bus: Arc<EventBus>) -> Self {
        let generators: Arc<Registry> = Arc::new(RwLock::new(HashMap::new()));

        let weak = Arc::downgrade(&generators);
        let requested = {
            let bus_for_handler = Arc::downgrade(&bus);
            bus.subscribe(move |event: &GenerationRequested| {
                if let (Some(generators), Some(bus)) =
                    (Weak::upgrade(&weak), Weak::upgrade(&bus_for_handler))
                {
                    dispatch(&generators, &bus, &event.algorithm, event.params.clone());
                }
                Ok(())
            })
        };

        let weak = Arc::downgrade(&generators);
        let stop = bus.subscribe(move |event: &GenerationCancelRequested| {
            if let Some(generators) = Weak::upgrade(&weak) {
                cancel(&generators, event.algorithm.as_deref());
            }
            Ok(())
        });

        Self {
            generators,
            bus,
            subscriptions: vec![
                (TypeId::of::<GenerationRequested>(), requested),
                (TypeId::of::<GenerationCancelRequested>(), stop),
            ],
        }
    }

    /// Creates a hub with the built-in `"lsystem"` and `"wfc"` generators.
    ///
    /// WFC runs are queued on `pool` at `wfc_priority`.
    pub fn with_defaults(bus: Arc<EventBus>, pool: Arc<TaskPool>, wfc_priority: i32) -> Self {
        let hub = Self::new(bus.clone());
        hub.register(Arc::new(LSystemGenerator::new(bus.clone())));
        hub.register(Arc::new(WfcGenerator::new(bus, pool, wfc_priority)));
        hub
    }

    /// Registers `generator` under its name, returning the one it replaces.
    pub fn register(
        &self,
        generator: Arc<dyn ProceduralGenerator>,
    ) -> Option<Arc<dyn ProceduralGenerator>> {
        let name = generator.name().to_string();
        log::debug!("Registering generator '{name}'.");
        self.generators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, generator)
    }

    /// Removes the generator registered as `name`.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ProceduralGenerator>> {
        self.generators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Returns the generator registered as `name`.
    pub fn generator(&self, name: &str) -> Option<Arc<dyn ProceduralGenerator>> {
        find(&self.generators, name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .generators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Same as publishing a [`GenerationRequested`], but returns the id of the
    /// started run. `None` means the request was rejected and already reported.
    pub fn request(&self, algorithm: &str, params: serde_json::Value) -> Option<JobId> {
        dispatch(&self.generators, &self.bus, algorithm, params)
    }

    /// Cancels the named generator, or every generator for `None`.
    pub fn cancel(&self, algorithm: Option<&str>) {
        cancel(&self.generators, algorithm);
    }

    /// Returns `true` if any registered generator has a run in flight.
    pub fn is_running(&self) -> bool {
        snapshot(&self.generators).iter().any(|g| g.is_running())
    }
}

impl Drop for GeneratorHub {
    fn drop(&mut self) {
        for (event_type, id) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(event_type, id);
        }
    }
}

fn find(generators: &Registry, name: &str) -> Option<Arc<dyn ProceduralGenerator>> {
    generators
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
}

fn snapshot(generators: &Registry) -> Vec<Arc<dyn ProceduralGenerator>> {
    generators
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect()
}

/// Starts `algorithm` with the registry lock released.
fn dispatch(
    generators: &Registry,
    bus: &EventBus,
    algorithm: &str,
    params: serde_json::Value,
) -> Option<JobId> {
    let Some(generator) = find(generators, algorithm) else {
        log::warn!("No generator registered for algorithm '{algorithm}'.");
        bus.publish(JobCompleted::<GeneratedModel>::failed(
            JobId::next(),
            format!("unknown algorithm '{algorithm}'"),
        ));
        return None;
    };

    match generator.generate(params) {
        Ok(id) => {
            log::info!("Generation {id} started with '{algorithm}'.");
            Some(id)
        }
        Err(e) => {
            log::error!("Failed to start '{algorithm}': {e}");
            bus.publish(JobCompleted::<GeneratedModel>::failed(
                JobId::next(),
                format!("could not start '{algorithm}': {e}"),
            ));
            None
        }
    }
}

fn cancel(generators: &Registry, algorithm: Option<&str>) {
    match algorithm {
        Some(name) => match find(generators, name) {
            Some(generator) => generator.cancel(),
            None => log::warn!("Cannot cancel unknown generator '{name}'."),
        },
        None => {
            for generator in snapshot(generators) {
                generator.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rethink_core::job::RunnerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts calls without running anything.
    #[derive(Default)]
    struct Recorder {
        generated: AtomicUsize,
        cancelled: AtomicUsize,
    }

    struct RecordingGenerator(&'static str, Arc<Recorder>);

    impl ProceduralGenerator for RecordingGenerator {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(&self, _params: serde_json::Value) -> Result<JobId, RunnerError> {
            self.1.generated.fetch_add(1, Ordering::SeqCst);
            Ok(JobId::next())
        }

        fn cancel(&self) {
            self.1.cancelled.fetch_add(1, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    fn recorder(hub: &GeneratorHub, name: &'static str) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        hub.register(Arc::new(RecordingGenerator(name, recorder.clone())));
        recorder
    }

    #[test]
    fn test_requests_reach_the_named_generator() {
        let bus = Arc::new(EventBus::new());
        let hub = GeneratorHub::new(bus.clone());
        let a = recorder(&hub, "a");
        let b = recorder(&hub, "b");

        bus.publish(GenerationRequested {
            algorithm: "b".into(),
            params: serde_json::Value::Null,
        });

        assert_eq!(a.generated.load(Ordering::SeqCst), 0);
        assert_eq!(b.generated.load(Ordering::SeqCst), 1);
        assert_eq!(hub.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unknown_algorithm_is_reported_as_a_failure() {
        let bus = Arc::new(EventBus::new());
        let hub = GeneratorHub::new(bus.clone());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        bus.subscribe(move |e: &JobCompleted<GeneratedModel>| {
            sink.lock().unwrap().push((e.success, e.error.clone()));
            Ok(())
        });

        assert_eq!(hub.request("marching-cubes", serde_json::Value::Null), None);

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(!failures[0].0);
        assert_eq!(
            failures[0].1.as_deref(),
            Some("unknown algorithm 'marching-cubes'")
        );
    }

    #[test]
    fn test_cancel_requests_target_one_or_all() {
        let bus = Arc::new(EventBus::new());
        let hub = GeneratorHub::new(bus.clone());
        let a = recorder(&hub, "a");
        let b = recorder(&hub, "b");

        bus.publish(GenerationCancelRequested {
            algorithm: Some("a".into()),
        });
        assert_eq!(a.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(b.cancelled.load(Ordering::SeqCst), 0);

        bus.publish(GenerationCancelRequested::default());
        assert_eq!(a.cancelled.load(Ordering::SeqCst), 2);
        assert_eq!(b.cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registering_a_name_twice_replaces_the_generator() {
        let hub = GeneratorHub::new(Arc::new(EventBus::new()));
        recorder(&hub, "a");
        let replaced = hub.register(Arc::new(RecordingGenerator("a", Arc::default())));
        assert!(replaced.is_some());
        assert_eq!(hub.names().len(), 1);
        assert!(hub.unregister("a").is_some());
        assert!(hub.generator("a").is_none());
    }

    #[test]
    fn test_dropping_the_hub_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let hub = GeneratorHub::new(bus.clone());
        assert!(bus.has_subscribers::<GenerationRequested>());
        drop(hub);
        assert!(!bus.has_subscribers::<GenerationRequested>());
        assert!(!bus.has_subscribers::<GenerationCancelRequested>());
    }
}
