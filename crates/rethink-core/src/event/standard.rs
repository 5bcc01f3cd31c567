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

//! Event kinds shared by the core components.
//!
//! Jobs publish the lifecycle events ([`JobStarted`], [`JobProgress`],
//! [`JobCompleted`], [`JobStopped`]); the command stack consumes the history
//! requests ([`PushOperationRequested`], [`UndoRequested`], [`RedoRequested`]).

use crate::command::Operation;
use crate::job::JobId;

/// A job began executing.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStarted {
    /// The run that started.
    pub job: JobId,
    /// Human-readable name of the job (e.g. the generator name).
    pub name: String,
}

/// A running job reached a progress checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobProgress {
    /// The run reporting progress.
    pub job: JobId,
    /// Completed fraction, always within `[0, 1]`.
    pub fraction: f32,
}

/// A job ran to its end without being cancelled.
///
/// Generic over the payload so every payload type gets its own channel on the
/// bus: subscribers to `JobCompleted<GeneratedModel>` never see texture loads.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCompleted<P> {
    /// The run that completed.
    pub job: JobId,
    /// Whether the job produced its payload.
    pub success: bool,
    /// Failure description when `success` is `false`.
    pub error: Option<String>,
    /// The produced data when `success` is `true`.
    pub payload: Option<P>,
}

impl<P> JobCompleted<P> {
    /// A successful completion carrying `payload`.
    pub fn succeeded(job: JobId, payload: P) -> Self {
        Self {
            job,
            success: true,
            error: None,
            payload: Some(payload),
        }
    }

    /// A failed completion carrying `error`.
    pub fn failed(job: JobId, error: impl Into<String>) -> Self {
        Self {
            job,
            success: false,
            error: Some(error.into()),
            payload: None,
        }
    }
}

/// A job observed its cancellation token and stopped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStopped {
    /// The run that stopped.
    pub job: JobId,
}

/// Asks the command stack to record a reversible operation.
#[derive(Debug, Clone)]
pub struct PushOperationRequested {
    /// The operation to record. It has already been performed by the sender.
    pub operation: Operation,
}

/// Asks the command stack to undo its most recent operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoRequested;

/// Asks the command stack to redo its most recently undone operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedoRequested;
