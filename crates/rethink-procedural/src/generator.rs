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

use rethink_core::job::{JobError, RunnerError};
use rethink_core::JobId;
use serde::de::DeserializeOwned;

/// A named producer of [`GeneratedModel`](crate::GeneratedModel)s.
///
/// Implementors run each request as a job, so starting a new generation
/// cancels and joins the previous one.
pub trait ProceduralGenerator: Send + Sync {
    /// The name requests use to address this generator.
    fn name(&self) -> &str;

    /// Starts a generation with `params` and returns the id of the new run.
    ///
    /// Parameter errors are reported by the run itself as a failed completion.
    fn generate(&self, params: serde_json::Value) -> Result<JobId, RunnerError>;

    /// Requests cancellation of the current run, if any.
    fn cancel(&self);

    /// Returns `true` while a run is in flight.
    fn is_running(&self) -> bool;
}

/// Decodes request parameters. `null` means "all defaults".
pub(crate) fn parse_params<P>(algorithm: &str, params: serde_json::Value) -> Result<P, JobError>
where
    P: DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(P::default());
    }
    serde_json::from_value(params).map_err(|e| {
        JobError::Failed(anyhow::anyhow!("invalid {algorithm} parameters: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn test_null_params_use_defaults() {
        let parsed: Sample = parse_params("sample", serde_json::Value::Null).unwrap();
        assert_eq!(parsed, Sample::default());
    }

    #[test]
    fn test_malformed_params_fail_with_algorithm_name() {
        let err = parse_params::<Sample>("sample", serde_json::json!({ "count": "many" }))
            .unwrap_err();
        assert!(err.to_string().contains("invalid sample parameters"));
    }
}
