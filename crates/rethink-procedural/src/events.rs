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

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asks the [`GeneratorHub`](crate::GeneratorHub) to run the generator named
/// `algorithm` with the given parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequested {
    /// Registered name of the generator, e.g. `"lsystem"` or `"wfc"`.
    pub algorithm: String,
    /// Generator-specific parameters. Missing fields take their defaults.
    pub params: serde_json::Value,
}

/// Asks running generators to stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationCancelRequested {
    /// Only cancel this generator. `None` cancels every registered one.
    pub algorithm: Option<String>,
}

/// One tile chosen by the WFC generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlacement {
    /// Tile name from the request's tile set.
    pub tile: String,
    /// Grid cell as `[x, y, z]`.
    pub position: [u32; 3],
}

/// Geometry produced by a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedModel {
    /// Fresh identifier for this model.
    pub id: Uuid,
    /// Name of the generator that produced it.
    pub algorithm: String,
    /// Vertex positions.
    pub vertices: Vec<[f32; 3]>,
    /// Line-list indices into `vertices`. Empty for tile models.
    pub indices: Vec<u32>,
    /// Tile placements. Empty for line models.
    pub tiles: Vec<TilePlacement>,
}

impl GeneratedModel {
    /// Creates an empty model tagged with `algorithm` and a new id.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            algorithm: algorithm.into(),
            vertices: Vec::new(),
            indices: Vec::new(),
            tiles: Vec::new(),
        }
    }

    /// Returns `true` if the model holds no geometry.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.tiles.is_empty()
    }
}
