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

//! Wave function collapse over a 3D tile grid.
//!
//! Every cell starts with the full tile set as candidates. Each step collapses
//! the cell with the fewest remaining candidates (ties broken at random) to a
//! single tile, then propagates the adjacency rules until the grid is stable.
//! A cell left without candidates is a contradiction and fails the run; there
//! is no backtracking.
//!
//! Adjacency rules map a tile to the tiles allowed in the six cells around it.
//! Tiles absent from the rules accept any neighbour. A finished grid satisfies
//! the rules in both directions.

use crate::generator::{parse_params, ProceduralGenerator};
use crate::{GeneratedModel, TilePlacement};
use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rethink_core::job::{JobError, RunnerError};
use rethink_core::{EventBus, Job, JobContext, JobId, JobRunner, TaskPool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const NAME: &str = "wfc";

/// Candidate sets are bit masks.
pub const MAX_TILES: usize = u64::BITS as usize;

/// Upper bound on `width * height * depth`.
pub const MAX_CELLS: usize = 1 << 18;

/// Parameters accepted by [`WfcGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WfcParams {
    /// Tile names, at most [`MAX_TILES`].
    pub tile_set: Vec<String>,
    /// Cells along x.
    pub width: usize,
    /// Cells along y.
    pub height: usize,
    /// Cells along z.
    pub depth: usize,
    /// Tile name to the tiles allowed next to it.
    pub adjacency_rules: HashMap<String, Vec<String>>,
    /// Seed for tile selection. A random seed is drawn when absent.
    pub seed: Option<u64>,
}

impl Default for WfcParams {
    fn default() -> Self {
        Self {
            tile_set: Vec::new(),
            width: 10,
            height: 10,
            depth: 10,
            adjacency_rules: HashMap::new(),
            seed: None,
        }
    }
}

impl WfcParams {
    /// Checks the parameters and turns the rules into one mask per tile.
    fn neighbour_masks(&self) -> anyhow::Result<Vec<u64>> {
        if self.tile_set.is_empty() {
            bail!("tile set is empty");
        }
        if self.tile_set.len() > MAX_TILES {
            bail!(
                "tile set holds {} tiles, at most {MAX_TILES} are supported",
                self.tile_set.len()
            );
        }
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            bail!(
                "grid dimensions must be non-zero, got {}x{}x{}",
                self.width,
                self.height,
                self.depth
            );
        }
        let cells = self
            .width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.depth))
            .filter(|&n| n <= MAX_CELLS);
        if cells.is_none() {
            bail!("grid exceeds {MAX_CELLS} cells");
        }

        let mut index = HashMap::with_capacity(self.tile_set.len());
        for (i, tile) in self.tile_set.iter().enumerate() {
            if index.insert(tile.as_str(), i).is_some() {
                bail!("tile '{tile}' appears twice in the tile set");
            }
        }
        let lookup = |tile: &str| {
            index
                .get(tile)
                .copied()
                .with_context(|| format!("adjacency rules name unknown tile '{tile}'"))
        };

        let everything = full_mask(self.tile_set.len());
        let mut masks = vec![everything; self.tile_set.len()];
        for (tile, neighbours) in &self.adjacency_rules {
            let mut mask = 0u64;
            for neighbour in neighbours {
                mask |= 1 << lookup(neighbour)?;
            }
            masks[lookup(tile)?] = mask;
        }
        Ok(masks)
    }
}

fn full_mask(tiles: usize) -> u64 {
    if tiles >= MAX_TILES {
        u64::MAX
    } else {
        (1u64 << tiles) - 1
    }
}

struct Grid {
    size: [usize; 3],
    cells: Vec<u64>,
}

impl Grid {
    fn position(&self, cell: usize) -> [usize; 3] {
        let [w, h, _] = self.size;
        [cell % w, (cell / w) % h, cell / (w * h)]
    }

    fn neighbours(&self, cell: usize) -> impl Iterator<Item = usize> {
        let [w, h, d] = self.size;
        let [x, y, z] = self.position(cell);
        let layer = w * h;
        [
            (x > 0).then(|| cell - 1),
            (x + 1 < w).then(|| cell + 1),
            (y > 0).then(|| cell - w),
            (y + 1 < h).then(|| cell + w),
            (z > 0).then(|| cell - layer),
            (z + 1 < d).then(|| cell + layer),
        ]
        .into_iter()
        .flatten()
    }
}

/// Undecided cells grouped by candidate count, so the lowest-entropy lookup
/// does not scan the grid.
struct EntropyIndex {
    buckets: Vec<Vec<usize>>,
    // Position of each cell inside its bucket.
    slot: Vec<usize>,
}

impl EntropyIndex {
    fn new(cells: &[u64]) -> Self {
        let mut index = Self {
            buckets: vec![Vec::new(); MAX_TILES + 1],
            slot: vec![0; cells.len()],
        };
        for (cell, mask) in cells.iter().enumerate() {
            index.insert(cell, mask.count_ones());
        }
        index
    }

    fn insert(&mut self, cell: usize, count: u32) {
        let bucket = &mut self.buckets[count as usize];
        self.slot[cell] = bucket.len();
        bucket.push(cell);
    }

    fn update(&mut self, cell: usize, from: u32, to: u32) {
        let position = self.slot[cell];
        let bucket = &mut self.buckets[from as usize];
        bucket.swap_remove(position);
        if let Some(&moved) = bucket.get(position) {
            self.slot[moved] = position;
        }
        self.insert(cell, to);
    }

    /// Cells sharing the smallest candidate count above one.
    fn lowest(&self) -> Option<&[usize]> {
        self.buckets[2..]
            .iter()
            .find(|bucket| !bucket.is_empty())
            .map(Vec::as_slice)
    }
}

struct Solver {
    grid: Grid,
    entropy: EntropyIndex,
    neighbour_masks: Vec<u64>,
    rng: StdRng,
    collapsed: usize,
}

impl Solver {
    /// Tiles allowed next to a cell whose candidates are `mask`.
    fn support(&self, mut mask: u64) -> u64 {
        let mut allowed = 0;
        while mask != 0 {
            let tile = mask.trailing_zeros() as usize;
            allowed |= self.neighbour_masks[tile];
            mask &= mask - 1;
        }
        allowed
    }

    fn narrow(&mut self, cell: usize, mask: u64) {
        let from = self.grid.cells[cell].count_ones();
        let to = mask.count_ones();
        if to == 1 && from > 1 {
            self.collapsed += 1;
        }
        self.grid.cells[cell] = mask;
        self.entropy.update(cell, from, to);
    }

    fn propagate(&mut self, mut stack: Vec<usize>) -> anyhow::Result<()> {
        while let Some(cell) = stack.pop() {
            let support = self.support(self.grid.cells[cell]);
            for n in self.grid.neighbours(cell) {
                let before = self.grid.cells[n];
                let after = before & support;
                if after == before {
                    continue;
                }
                if after == 0 {
                    let [x, y, z] = self.grid.position(n);
                    bail!("contradiction at cell ({x}, {y}, {z})");
                }
                self.narrow(n, after);
                stack.push(n);
            }
        }
        Ok(())
    }

    /// Picks, at random, one of the undecided cells with the fewest candidates.
    fn lowest_entropy(&mut self) -> Option<usize> {
        let candidates = self.entropy.lowest()?;
        let pick = self.rng.gen_range(0..candidates.len());
        Some(candidates[pick])
    }

    fn collapse(&mut self, cell: usize) {
        let mut mask = self.grid.cells[cell];
        let pick = self.rng.gen_range(0..mask.count_ones());
        for _ in 0..pick {
            mask &= mask - 1;
        }
        self.narrow(cell, 1 << mask.trailing_zeros());
    }
}

fn solve(params: &WfcParams, ctx: &JobContext) -> Result<GeneratedModel, JobError> {
    let neighbour_masks = params.neighbour_masks()?;
    let seed = params.seed.unwrap_or_else(rand::random);
    let total = params.width * params.height * params.depth;
    log::debug!(
        "WFC over {}x{}x{} cells with {} tiles, seed {seed}",
        params.width,
        params.height,
        params.depth,
        params.tile_set.len()
    );

    let single = params.tile_set.len() == 1;
    let cells = vec![full_mask(params.tile_set.len()); total];
    let mut solver = Solver {
        entropy: EntropyIndex::new(&cells),
        grid: Grid {
            size: [params.width, params.height, params.depth],
            cells,
        },
        neighbour_masks,
        rng: StdRng::seed_from_u64(seed),
        collapsed: if single { total } else { 0 },
    };

    // Rules can rule tiles out before anything is chosen.
    solver.propagate((0..total).collect())?;

    let mut reported = 0;
    while let Some(cell) = solver.lowest_entropy() {
        ctx.checkpoint()?;
        solver.collapse(cell);
        solver.propagate(vec![cell])?;

        let percent = solver.collapsed * 100 / total;
        if percent > reported {
            reported = percent;
            ctx.report_progress(solver.collapsed as f32 / total as f32);
        }
    }
    if reported < 100 {
        ctx.report_progress(1.0);
    }

    let mut model = GeneratedModel::new(NAME);
    model.vertices.reserve(total);
    model.tiles.reserve(total);
    for (cell, mask) in solver.grid.cells.iter().enumerate() {
        let [x, y, z] = solver.grid.position(cell);
        model.vertices.push([x as f32, y as f32, z as f32]);
        model.tiles.push(TilePlacement {
            tile: params.tile_set[mask.trailing_zeros() as usize].clone(),
            position: [x as u32, y as u32, z as u32],
        });
    }
    Ok(model)
}

struct WfcJob {
    params: serde_json::Value,
}

impl Job for WfcJob {
    type Output = GeneratedModel;

    fn name(&self) -> &str {
        NAME
    }

    fn run(self, ctx: &JobContext) -> Result<GeneratedModel, JobError> {
        let params: WfcParams = parse_params(NAME, self.params)?;
        solve(&params, ctx)
    }
}

/// Fills tile grids as tasks of a shared [`TaskPool`].
pub struct WfcGenerator {
    runner: JobRunner,
}

impl WfcGenerator {
    /// Creates a generator that runs on `pool` at `priority` and reports on `bus`.
    pub fn new(bus: Arc<EventBus>, pool: Arc<TaskPool>, priority: i32) -> Self {
        Self {
            runner: JobRunner::pooled(bus, pool, priority),
        }
    }

    /// Blocks until the current run, if any, has finished.
    pub fn wait(&self) {
        self.runner.wait();
    }
}

impl ProceduralGenerator for WfcGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn generate(&self, params: serde_json::Value) -> Result<JobId, RunnerError> {
        self.runner.start(WfcJob { params })
    }

    fn cancel(&self) {
        self.runner.cancel();
    }

    fn is_running(&self) -> bool {
        self.runner.is_running()
    }
}
