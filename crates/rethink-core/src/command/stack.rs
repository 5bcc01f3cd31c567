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

use super::operation::Operation;
use crate::config::HistoryConfig;
use crate::event::{
    EventBus, PushOperationRequested, RedoRequested, SubscriptionId, UndoRequested,
};
use crate::utils::{lock, panic_message};
use std::any::TypeId;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// Errors raised by [`CommandStack::push_operation`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The operation lacks its execute or its undo action and was not recorded.
    #[error("operation '{label}' is missing its execute or undo action")]
    Incomplete {
        /// Label of the rejected operation.
        label: String,
    },
}

#[derive(Default)]
struct Stacks {
    undo: Vec<Operation>,
    redo: Vec<Operation>,
    // Bumped whenever the redo history is invalidated.
    generation: u64,
}

struct History {
    stacks: Mutex<Stacks>,
    // Held for a whole undo or redo step, closures included.
    apply: Mutex<()>,
    applier: Mutex<Option<ThreadId>>,
    max_depth: Option<usize>,
}

impl History {
    fn trim(&self, stacks: &mut Stacks) {
        if let Some(max_depth) = self.max_depth {
            let excess = stacks.undo.len().saturating_sub(max_depth);
            if excess > 0 {
                stacks.undo.drain(..excess);
                log::trace!("History trimmed {excess} oldest operation(s).");
            }
        }
    }

    fn push(&self, operation: Operation) -> Result<(), CommandError> {
        if !operation.is_complete() {
            log::warn!(
                "Rejected operation '{}': missing execute or undo action.",
                operation.label()
            );
            return Err(CommandError::Incomplete {
                label: operation.label().to_string(),
            });
        }

        let mut stacks = lock(&self.stacks);
        log::trace!("Recorded operation '{}'.", operation.label());
        stacks.undo.push(operation);
        stacks.redo.clear();
        stacks.generation += 1;
        self.trim(&mut stacks);
        Ok(())
    }

    /// Runs `step` while holding the apply lock, so whole undo and redo steps
    /// never interleave. A nested request from inside a closure is refused.
    fn exclusive(&self, what: &str, step: impl FnOnce() -> bool) -> bool {
        let current = thread::current().id();
        if *lock(&self.applier) == Some(current) {
            log::warn!("Ignored {what} requested from inside an undo or redo action.");
            return false;
        }

        let _apply = lock(&self.apply);
        *lock(&self.applier) = Some(current);
        let done = step();
        *lock(&self.applier) = None;
        done
    }

    fn undo(&self) -> bool {
        self.exclusive("undo", || {
            let (operation, generation) = {
                let mut stacks = lock(&self.stacks);
                match stacks.undo.pop() {
                    Some(operation) => (operation, stacks.generation),
                    None => {
                        log::debug!("Nothing to undo.");
                        return false;
                    }
                }
            };

            // The closure may publish on the bus, so the stacks stay unlocked.
            if let Err(message) = guarded(|| operation.revert()) {
                log::error!("Undo of '{}' failed: {message}", operation.label());
            }

            let mut stacks = lock(&self.stacks);
            if stacks.generation == generation {
                stacks.redo.push(operation);
            } else {
                log::debug!(
                    "History changed while undoing '{}'; it will not be redoable.",
                    operation.label()
                );
            }
            true
        })
    }

    fn redo(&self) -> bool {
        self.exclusive("redo", || {
            let (operation, depth) = {
                let mut stacks = lock(&self.stacks);
                match stacks.redo.pop() {
                    Some(operation) => {
                        let depth = stacks.undo.len();
                        (operation, depth)
                    }
                    None => {
                        log::debug!("Nothing to redo.");
                        return false;
                    }
                }
            };

            if let Err(message) = guarded(|| operation.apply()) {
                log::error!("Redo of '{}' failed: {message}", operation.label());
            }

            // Operations pushed by the closure were applied after this one.
            let mut stacks = lock(&self.stacks);
            let at = depth.min(stacks.undo.len());
            stacks.undo.insert(at, operation);
            self.trim(&mut stacks);
            true
        })
    }
}

fn guarded(action: impl FnOnce() -> anyhow::Result<()>) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(&*payload))),
    }
}

/// Two stacks of reversible operations, reachable through the bus.
///
/// On construction the stack subscribes to [`PushOperationRequested`],
/// [`UndoRequested`] and [`RedoRequested`]; it unsubscribes when dropped.
/// Undo and redo steps run one at a time, closures included, so concurrent
/// requests behave as if issued in sequence. The stacks themselves are locked
/// only for edits, which lets a closure push a new operation; a closure that
/// requests another undo or redo is refused.
pub struct CommandStack {
    history: Arc<History>,
    bus: Arc<EventBus>,
    subscriptions: Vec<(TypeId, SubscriptionId)>,
}

impl CommandStack {
    /// Creates an unbounded history wired to `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_config(bus, &HistoryConfig::default())
    }

    /// Creates a history wired to `bus` with the given settings.
    pub fn with_config(bus: Arc<EventBus>, config: &HistoryConfig) -> Self {
        let history = Arc::new(History {
            stacks: Mutex::new(Stacks::default()),
            apply: Mutex::new(()),
            applier: Mutex::new(None),
            max_depth: config.max_depth,
        });

        let weak = Arc::downgrade(&history);
        let push = bus.subscribe(move |event: &PushOperationRequested| {
            if let Some(history) = Weak::upgrade(&weak) {
                // Rejections are already logged by the history.
                let _ = history.push(event.operation.clone());
            }
            Ok(())
        });

        let weak = Arc::downgrade(&history);
        let undo = bus.subscribe(move |_: &UndoRequested| {
            if let Some(history) = Weak::upgrade(&weak) {
                history.undo();
            }
            Ok(())
        });

        let weak = Arc::downgrade(&history);
        let redo = bus.subscribe(move |_: &RedoRequested| {
            if let Some(history) = Weak::upgrade(&weak) {
                history.redo();
            }
            Ok(())
        });

        Self {
            history,
            bus,
            subscriptions: vec![
                (TypeId::of::<PushOperationRequested>(), push),
                (TypeId::of::<UndoRequested>(), undo),
                (TypeId::of::<RedoRequested>(), redo),
            ],
        }
    }

    /// Records `operation` (which the caller has already performed) and
    /// clears the redo history. Incomplete operations are logged and rejected.
    pub fn push_operation(&self, operation: Operation) -> Result<(), CommandError> {
        self.history.push(operation)
    }

    /// Reverts the most recent operation and moves it to the redo stack.
    ///
    /// Returns `false` if there was nothing to undo. A failing undo action is
    /// logged; the operation still moves to the redo stack.
    pub fn undo(&self) -> bool {
        self.history.undo()
    }

    /// Re-applies the most recently undone operation and moves it back to the
    /// undo stack. Returns `false` if there was nothing to redo.
    pub fn redo(&self) -> bool {
        self.history.redo()
    }

    /// Number of operations that can be undone.
    pub fn undo_stack_size(&self) -> usize {
        lock(&self.history.stacks).undo.len()
    }

    /// Number of operations that can be redone.
    pub fn redo_stack_size(&self) -> usize {
        lock(&self.history.stacks).redo.len()
    }

    /// Returns `true` if [`undo`](Self::undo) would do something.
    pub fn can_undo(&self) -> bool {
        self.undo_stack_size() > 0
    }

    /// Returns `true` if [`redo`](Self::redo) would do something.
    pub fn can_redo(&self) -> bool {
        self.redo_stack_size() > 0
    }

    /// Label of the operation the next undo would revert.
    pub fn undo_label(&self) -> Option<String> {
        lock(&self.history.stacks)
            .undo
            .last()
            .map(|op| op.label().to_string())
    }

    /// Label of the operation the next redo would re-apply.
    pub fn redo_label(&self) -> Option<String> {
        lock(&self.history.stacks)
            .redo
            .last()
            .map(|op| op.label().to_string())
    }

    /// Forgets the whole history without running any action.
    pub fn clear(&self) {
        let mut stacks = lock(&self.history.stacks);
        stacks.undo.clear();
        stacks.redo.clear();
        stacks.generation += 1;
    }
}

impl Drop for CommandStack {
    fn drop(&mut self) {
        for (event_type, id) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(event_type, id);
        }
    }
}

impl fmt::Debug for CommandStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = lock(&self.history.stacks);
        f.debug_struct("CommandStack")
            .field("undo", &stacks.undo)
            .field("redo", &stacks.redo)
            .field("max_depth", &self.history.max_depth)
            .finish()
    }
}
