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

//! Provides the typed publish/subscribe bus modules communicate through.
//!
//! Any `Send + Sync + 'static` value is an event; its concrete type is the
//! channel it travels on. Delivery is synchronous: [`EventBus::publish`] runs
//! every handler of that type on the calling thread, in [`Priority`] order,
//! before returning.
//!
//! The [`standard`] module holds the event kinds shared by the core components
//! themselves (job lifecycle and history requests).

mod bus;
pub mod standard;

pub use self::bus::{EventBus, Priority, SubscriptionId};
pub use self::standard::{
    JobCompleted, JobProgress, JobStarted, JobStopped, PushOperationRequested, RedoRequested,
    UndoRequested,
};
