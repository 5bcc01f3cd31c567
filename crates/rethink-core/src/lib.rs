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

//! # Rethink Core
//!
//! The coordination layer every editor module talks through instead of holding
//! references to each other:
//!
//! - [`event`]: a typed, priority-ordered, synchronous publish/subscribe bus.
//! - [`task`]: a fixed pool of worker threads draining a priority queue.
//! - [`job`]: the cancellable job protocol used by long-running producers.
//! - [`command`]: the undo/redo history, itself driven through the bus.

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod event;
pub mod job;
pub mod task;

mod utils;

pub use command::{CommandStack, Operation};
pub use config::CoreConfig;
pub use event::{EventBus, Priority, SubscriptionId};
pub use job::{CancellationToken, Job, JobContext, JobId, JobRunner};
pub use task::{Handle, TaskPool};
