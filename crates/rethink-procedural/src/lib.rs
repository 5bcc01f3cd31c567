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

//! Procedural model generators built on the rethink job protocol.
//!
//! Every generator owns one [`JobRunner`](rethink_core::JobRunner) and
//! announces its runs with the standard job events. A successful run carries a
//! [`GeneratedModel`] in its [`JobCompleted`](rethink_core::event::JobCompleted).
//! The [`GeneratorHub`] routes [`GenerationRequested`] events to the generator
//! named in the request.

#![warn(missing_docs)]

mod events;
mod generator;
mod hub;
mod lsystem;
mod wfc;

pub use self::events::{
    GeneratedModel, GenerationCancelRequested, GenerationRequested, TilePlacement,
};
pub use self::generator::ProceduralGenerator;
pub use self::hub::GeneratorHub;
pub use self::lsystem::{LSystemGenerator, LSystemParams};
pub use self::wfc::{WfcGenerator, WfcParams};
