// Dweve Veneer - Surface Syntax Language Bridge
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bidirectional position mapping between Veneer surface files and the Go
//! files generated from them.
//!
//! A surface file (`main.vnr`) is transformed into valid Go (`main.go`) by an
//! external tool. The tool reports every construct it expanded as a
//! [`TransformationRecord`] and leaves a marker comment in the output. This
//! crate turns those records plus the generated source into a
//! [`MappingTable`], persists it next to the generated file, caches it, and
//! answers position queries in both directions.
//!
//! # Pipeline
//!
//! 1. [`MappingGenerator`] parses the generated Go with tree-sitter, binds each
//!    record to the statement its marker belongs to, and maps every other
//!    surface line through content-verified line-delta tracking.
//! 2. [`MappingTable::save`] writes the sidecar document (`main.go.map`).
//! 3. [`MappingStore`] loads and caches tables on demand.
//! 4. [`PositionTranslator`] converts positions, ranges and whole protocol
//!    payloads between coordinate systems.
//!
//! # Coordinates
//!
//! Tables use 1-based lines and character columns. Protocol positions are
//! 0-based; the translator converts at its boundary.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tower_lsp::lsp_types::Position;
//! use veneer_sourcemap::{Direction, MappingStore, PositionTranslator};
//!
//! let store = Arc::new(MappingStore::with_defaults());
//! let translator = PositionTranslator::new(store);
//! let out = translator
//!     .translate_position(
//!         Path::new("/work/main.vnr"),
//!         Position { line: 9, character: 4 },
//!         Direction::SurfaceToGenerated,
//!     )
//!     .unwrap();
//! println!("{}:{}", out.path.display(), out.position.line);
//! ```

pub mod error;
pub mod generator;
pub mod paths;
pub mod record;
pub mod store;
pub mod syntax;
pub mod table;
pub mod text;
pub mod translator;

pub use error::{SourceMapError, SourceMapResult};
pub use generator::{GenerationReport, GeneratorInput, GeneratorOutput, MappingGenerator};
pub use paths::{FileRole, PathScheme};
pub use record::{load_records, parse_records, TransformationRecord};
pub use store::{Clock, FsTableSource, MappingStore, StoreStatistics, SystemClock, TableSource};
pub use table::{MappingDocument, MappingEntry, MappingTable, MAX_SCHEMA_VERSION};
pub use translator::{Direction, FsLineSource, LineSource, PositionTranslator, Translated};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
