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

//! Undo/redo history built on reversible [`Operation`]s.
//!
//! Modules never hold the [`CommandStack`] directly; they publish
//! [`PushOperationRequested`](crate::event::PushOperationRequested),
//! [`UndoRequested`](crate::event::UndoRequested) and
//! [`RedoRequested`](crate::event::RedoRequested) on the bus.
//!
//! Recording an operation does not perform it. The sender applies the change
//! first and then pushes `{execute: reapply, undo: revert}`.

mod operation;
mod stack;

pub use self::operation::{Action, Operation};
pub use self::stack::{CommandError, CommandStack};
