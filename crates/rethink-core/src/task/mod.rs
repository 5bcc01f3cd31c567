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

//! A fixed set of worker threads executing a priority-ordered queue.
//!
//! Tasks are fallible closures submitted with an integer priority; higher
//! values run first and equal priorities run in submission order. Every
//! submission returns a [`Handle`] the caller can wait on for the result.
//! A failing or panicking task is reported through the pool's error callback
//! (or the log) and never takes its worker thread down.

mod error;
mod handle;
mod pool;

pub use self::error::{PoolError, TaskError};
pub use self::handle::Handle;
pub use self::pool::{ErrorCallback, TaskPool};
