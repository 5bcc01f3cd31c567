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

use super::error::JobError;
use super::token::CancellationToken;
use super::JobId;
use crate::event::{EventBus, JobProgress};
use std::sync::Arc;

/// What a running job sees of the outside world.
pub struct JobContext {
    id: JobId,
    token: CancellationToken,
    bus: Arc<EventBus>,
}

impl JobContext {
    /// Builds a context; normally done by [`JobRunner`](super::JobRunner).
    pub fn new(id: JobId, token: CancellationToken, bus: Arc<EventBus>) -> Self {
        Self { id, token, bus }
    }

    /// The id of this run.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The token this run is polled against.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A cancellation checkpoint: `ctx.checkpoint()?` stops the job promptly.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        self.token.checkpoint()
    }

    /// Publishes a [`JobProgress`] event. `fraction` is clamped to `[0, 1]`.
    pub fn report_progress(&self, fraction: f32) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.bus.publish(JobProgress {
            job: self.id,
            fraction,
        });
    }

    /// The bus, for jobs that publish domain events of their own.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_is_clamped() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.subscribe(move |p: &JobProgress| {
            s.lock().unwrap().push(p.fraction);
            Ok(())
        });

        let ctx = JobContext::new(JobId::next(), CancellationToken::new(), bus);
        ctx.report_progress(-0.5);
        ctx.report_progress(0.25);
        ctx.report_progress(7.0);
        ctx.report_progress(f32::NAN);

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.25, 1.0, 0.0]);
    }
}
