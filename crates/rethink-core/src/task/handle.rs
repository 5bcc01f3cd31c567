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

use super::error::TaskError;
use flume::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// The caller's side of a submitted task.
///
/// The pool holds the sending half; once the task has run (or has been dropped
/// at shutdown) the result becomes available here exactly once.
#[derive(Debug)]
pub struct Handle<R> {
    receiver: Receiver<Result<R, TaskError>>,
}

impl<R> Handle<R> {
    pub(crate) fn new(receiver: Receiver<Result<R, TaskError>>) -> Self {
        Self { receiver }
    }

    /// Blocks until the task has finished and returns its result.
    pub fn wait(self) -> Result<R, TaskError> {
        self.receiver.recv().unwrap_or(Err(TaskError::Dropped))
    }

    /// Blocks for at most `timeout`. Returns `None` if the task is still
    /// queued or running when the timeout expires.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R, TaskError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(TaskError::Dropped)),
        }
    }

    /// Takes the result if the task has already finished.
    pub fn try_take(&self) -> Option<Result<R, TaskError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Dropped)),
        }
    }

    /// Returns `true` once a result is available (or the task was dropped).
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty() || self.receiver.is_disconnected()
    }
}
