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

//! Branching trees built as line segments.

use crate::generator::{parse_params, ProceduralGenerator};
use crate::GeneratedModel;
use rethink_core::job::{JobError, RunnerError};
use rethink_core::{EventBus, Job, JobContext, JobId, JobRunner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const NAME: &str = "lsystem";

/// Trees with more levels than this would hold millions of segments.
pub const MAX_ITERATIONS: u32 = 20;

/// Parameters accepted by [`LSystemGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LSystemParams {
    /// Number of branching levels, trunk included.
    pub iterations: u32,
    /// Length of the trunk.
    pub length: f32,
    /// Angle in degrees between a branch and each of its two children.
    pub angle: f32,
    /// Length ratio between a child branch and its parent.
    pub scale: f32,
}

impl Default for LSystemParams {
    fn default() -> Self {
        Self {
            iterations: 3,
            length: 1.0,
            angle: 30.0,
            scale: 0.7,
        }
    }
}

impl LSystemParams {
    fn validate(&self) -> anyhow::Result<()> {
        if self.iterations > MAX_ITERATIONS {
            anyhow::bail!(
                "iterations must be at most {MAX_ITERATIONS}, got {}",
                self.iterations
            );
        }
        if !self.length.is_finite() || self.length <= 0.0 {
            anyhow::bail!("length must be positive, got {}", self.length);
        }
        if !self.angle.is_finite() {
            anyhow::bail!("angle must be finite");
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            anyhow::bail!("scale must be positive, got {}", self.scale);
        }
        Ok(())
    }
}

/// A branch waiting to be emitted: it starts at vertex `start`.
struct Pending {
    start: u32,
    heading: f32,
    length: f32,
}

struct LSystemJob {
    params: serde_json::Value,
}

impl Job for LSystemJob {
    type Output = GeneratedModel;

    fn name(&self) -> &str {
        NAME
    }

    fn run(self, ctx: &JobContext) -> Result<GeneratedModel, JobError> {
        let params: LSystemParams = parse_params(NAME, self.params)?;
        params.validate()?;
        build_tree(&params, ctx)
    }
}

/// Grows the tree one level at a time so progress can be reported per level.
fn build_tree(params: &LSystemParams, ctx: &JobContext) -> Result<GeneratedModel, JobError> {
    let mut model = GeneratedModel::new(NAME);
    if params.iterations == 0 {
        ctx.report_progress(1.0);
        return Ok(model);
    }

    let spread = params.angle.to_radians();
    model.vertices.push([0.0, 0.0, 0.0]);
    let mut level = vec![Pending {
        start: 0,
        heading: std::f32::consts::FRAC_PI_2,
        length: params.length,
    }];

    for depth in 1..=params.iterations {
        let mut next = Vec::with_capacity(level.len() * 2);
        for branch in level {
            ctx.checkpoint()?;

            let [x, y, z] = model.vertices[branch.start as usize];
            let (sin, cos) = branch.heading.sin_cos();
            let end = model.vertices.len() as u32;
            model
                .vertices
                .push([x + cos * branch.length, y + sin * branch.length, z]);
            model.indices.extend_from_slice(&[branch.start, end]);

            if depth < params.iterations {
                let length = branch.length * params.scale;
                next.push(Pending {
                    start: end,
                    heading: branch.heading + spread,
                    length,
                });
                next.push(Pending {
                    start: end,
                    heading: branch.heading - spread,
                    length,
                });
            }
        }
        ctx.report_progress(depth as f32 / params.iterations as f32);
        level = next;
    }

    log::debug!(
        "L-system tree with {} levels: {} segments",
        params.iterations,
        model.indices.len() / 2
    );
    Ok(model)
}

/// Builds binary trees on a dedicated thread.
pub struct LSystemGenerator {
    runner: JobRunner,
}

impl LSystemGenerator {
    /// Creates a generator that reports on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            runner: JobRunner::dedicated(bus),
        }
    }

    /// Blocks until the current run, if any, has finished.
    pub fn wait(&self) {
        self.runner.wait();
    }
}

impl ProceduralGenerator for LSystemGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn generate(&self, params: serde_json::Value) -> Result<JobId, RunnerError> {
        self.runner.start(LSystemJob { params })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }

    fn is_running(&self) -> bool {
        self.runner.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rethink_core::event::{JobCompleted, JobProgress};
    use rethink_core::CancellationToken;
    use std::sync::Mutex;

    fn context() -> JobContext {
        JobContext::new(JobId::next(), CancellationToken::new(), Arc::new(EventBus::new()))
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_tree_has_one_segment_per_branch() {
        let params = LSystemParams {
            iterations: 4,
            ..Default::default()
        };
        let model = build_tree(&params, &context()).unwrap();

        // 1 + 2 + 4 + 8 branches, children share their parent's end vertex.
        assert_eq!(model.indices.len(), 15 * 2);
        assert_eq!(model.vertices.len(), 16);
        assert!(model.indices.iter().all(|&i| (i as usize) < model.vertices.len()));
        assert_eq!(model.algorithm, "lsystem");
    }

    #[test]
    fn test_trunk_points_up_and_children_shrink() {
        let model = build_tree(&LSystemParams::default(), &context()).unwrap();

        let trunk_end = model.vertices[1];
        assert!(close(trunk_end[0], 0.0));
        assert!(close(trunk_end[1], 1.0));

        let child_end = model.vertices[2];
        let dx = child_end[0] - trunk_end[0];
        let dy = child_end[1] - trunk_end[1];
        assert!(close((dx * dx + dy * dy).sqrt(), 0.7));
        // The first child leans left of vertical by the branching angle.
        assert!(close(dy.atan2(dx).to_degrees(), 120.0));
    }

    #[test]
    fn test_zero_iterations_yield_an_empty_model() {
        let params = LSystemParams {
            iterations: 0,
            ..Default::default()
        };
        let model = build_tree(&params, &context()).unwrap();
        assert!(model.is_empty());
    }

    #[test]
    fn test_progress_is_reported_once_per_level() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |e: &JobProgress| {
            sink.lock().unwrap().push(e.fraction);
            Ok(())
        });
        let ctx = JobContext::new(JobId::next(), CancellationToken::new(), bus);

        build_tree(&LSystemParams::default(), &ctx).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(close(seen[0], 1.0 / 3.0));
        assert!(close(seen[2], 1.0));
    }

    #[test]
    fn test_cancelled_context_stops_the_build() {
        let ctx = context();
        ctx.token().cancel();
        let result = build_tree(&LSystemParams::default(), &ctx);
        assert!(matches!(result, Err(JobError::Cancelled)));
    }

    #[test]
    fn test_invalid_parameters_fail_the_run() {
        let bus = Arc::new(EventBus::new());
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        bus.subscribe(move |e: &JobCompleted<GeneratedModel>| {
            sink.lock().unwrap().push(e.error.clone());
            Ok(())
        });

        let generator = LSystemGenerator::new(bus);
        generator
            .generate(serde_json::json!({ "iterations": MAX_ITERATIONS + 1 }))
            .unwrap();
        generator.wait();

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        let message = failures[0].as_deref().unwrap_or_default();
        assert!(message.contains("iterations"), "{message}");
    }
}
