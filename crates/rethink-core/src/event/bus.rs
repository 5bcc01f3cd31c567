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

use crate::utils::{lock, panic_message};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Delivery tier of a subscription within a single publish.
///
/// The derived ordering is the delivery order: `High` handlers run first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Delivered before every other tier.
    High,
    /// The default tier.
    #[default]
    Normal,
    /// Delivered after every other tier.
    Low,
}

/// Identifies one subscription. Unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value of this id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type ErasedHandler = Arc<dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    priority: Priority,
    handler: ErasedHandler,
}

struct Channel {
    type_name: &'static str,
    // Kept sorted by priority, then by subscription order.
    subscribers: Vec<Subscriber>,
}

/// A thread-safe registry of typed subscribers with synchronous fan-out.
///
/// The subscriber table is guarded by a single lock that is only held long
/// enough to edit the table or to copy one channel's subscriber list. Handlers
/// always run against that copy with the lock released, so a handler may freely
/// subscribe, unsubscribe or publish (re-entrantly) while it is being invoked.
///
/// Share it between components as an `Arc<EventBus>`.
pub struct EventBus {
    channels: Mutex<HashMap<TypeId, Channel>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        log::debug!("EventBus initialized.");
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes `handler` to events of type `T` at [`Priority::Normal`].
    pub fn subscribe<T, F>(&self, handler: F) -> SubscriptionId
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_with(Priority::Normal, handler)
    }

    /// Subscribes `handler` to events of type `T` at the given priority.
    ///
    /// Among subscribers of the same priority, earlier subscriptions are
    /// delivered first.
    ///
    /// ## Arguments
    /// * `priority` - The delivery tier of this subscription.
    /// * `handler` - Called with every published `T`. Errors and panics are logged.
    ///
    /// ## Returns
    /// The id to pass to [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe_with<T, F>(&self, priority: Priority, handler: F) -> SubscriptionId
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: ErasedHandler = Arc::new(move |event: &dyn Any| match event
            .downcast_ref::<T>()
        {
            Some(event) => handler(event),
            None => Err(anyhow::anyhow!(
                "event routed to a handler for '{}' has a different type",
                type_name::<T>()
            )),
        });

        let mut channels = lock(&self.channels);
        let id = SubscriptionId::next();
        let channel = channels.entry(TypeId::of::<T>()).or_insert_with(|| Channel {
            type_name: type_name::<T>(),
            subscribers: Vec::new(),
        });
        let position = channel
            .subscribers
            .partition_point(|existing| existing.priority <= priority);
        channel.subscribers.insert(
            position,
            Subscriber {
                id,
                priority,
                handler,
            },
        );

        log::trace!(
            "Subscribed {id} to '{}' at {priority:?} ({} subscriber(s)).",
            channel.type_name,
            channel.subscribers.len()
        );
        id
    }

    /// Removes a subscription from the channel identified by `event_type`.
    ///
    /// Unknown ids are ignored. Returns `true` if a subscription was removed.
    /// A channel whose last subscriber is removed is dropped from the table.
    pub fn unsubscribe(&self, event_type: TypeId, id: SubscriptionId) -> bool {
        let mut channels = lock(&self.channels);
        let Some(channel) = channels.get_mut(&event_type) else {
            return false;
        };

        let before = channel.subscribers.len();
        channel.subscribers.retain(|subscriber| subscriber.id != id);
        let removed = channel.subscribers.len() != before;
        if removed {
            log::trace!("Unsubscribed {id} from '{}'.", channel.type_name);
        }
        if channel.subscribers.is_empty() {
            channels.remove(&event_type);
        }
        removed
    }

    /// Typed convenience for [`unsubscribe`](Self::unsubscribe).
    pub fn unsubscribe_from<T: Any>(&self, id: SubscriptionId) -> bool {
        self.unsubscribe(TypeId::of::<T>(), id)
    }

    /// Delivers `event` to every current subscriber of `T`.
    ///
    /// Returns once all handlers have run on the calling thread. A handler that
    /// returns an error or panics is logged with the event type and does not
    /// prevent delivery to the remaining subscribers.
    ///
    /// ## Arguments
    /// * `event` - The event handed by reference to each subscriber.
    pub fn publish<T: Any + Send + Sync>(&self, event: T) {
        let snapshot: Vec<Subscriber> = {
            let channels = lock(&self.channels);
            match channels.get(&TypeId::of::<T>()) {
                Some(channel) => channel.subscribers.clone(),
                None => return,
            }
        };

        for subscriber in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(&event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!(
                    "Handler {} for event '{}' failed: {e:#}",
                    subscriber.id,
                    type_name::<T>()
                ),
                Err(payload) => log::error!(
                    "Handler {} for event '{}' panicked: {}",
                    subscriber.id,
                    type_name::<T>(),
                    panic_message(&*payload)
                ),
            }
        }
    }

    /// Returns how many handlers are currently subscribed to `T`.
    pub fn subscriber_count<T: Any>(&self) -> usize {
        lock(&self.channels)
            .get(&TypeId::of::<T>())
            .map_or(0, |channel| channel.subscribers.len())
    }

    /// Returns `true` if at least one handler is subscribed to `T`.
    pub fn has_subscribers<T: Any>(&self) -> bool {
        self.subscriber_count::<T>() > 0
    }

    /// Drops every subscription on every channel.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *lock(&self.channels));
        log::debug!("EventBus cleared ({} channel(s)).", removed.len());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = lock(&self.channels);
        let mut map = f.debug_map();
        for channel in channels.values() {
            map.entry(&channel.type_name, &channel.subscribers.len());
        }
        map.finish()
    }
}
