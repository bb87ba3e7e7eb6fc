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

//! Transformation records emitted by the surface-to-Go transform stage.
//!
//! One record exists per site where the generated code is not a straight copy
//! of the surface line. The transform stage writes them as a JSON array next to
//! the generated file; records are the only handoff between that stage and the
//! mapping generator.

use crate::error::{SourceMapError, SourceMapResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A single transformation site.
///
/// Lines and columns are 1-based and refer to the surface file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRecord {
    /// Surface line of the transformed construct.
    pub original_line: u32,
    /// Surface column where the construct starts.
    pub original_column: u32,
    /// Length in characters of the surface construct.
    pub original_length: u32,
    /// Opaque token the transform left in the generated code (usually inside a comment).
    pub generated_marker: String,
    /// Transformation kind, e.g. `error_prop` or `lambda`.
    pub kind: String,
}

impl TransformationRecord {
    /// Create a record.
    pub fn new(
        original_line: u32,
        original_column: u32,
        original_length: u32,
        generated_marker: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            original_line,
            original_column,
            original_length,
            generated_marker: generated_marker.into(),
            kind: kind.into(),
        }
    }
}

/// Parse a records document.
pub fn parse_records(path: &Path, content: &str) -> SourceMapResult<Vec<TransformationRecord>> {
    let mut records: Vec<TransformationRecord> =
        serde_json::from_str(content).map_err(|e| SourceMapError::MalformedDocument {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    // Producers are expected to emit in order; sorting is stable so equal keys keep theirs.
    records.sort_by_key(|r| (r.original_line, r.original_column));
    Ok(records)
}

/// Load the records file written by the transform stage.
///
/// A missing file means the transform made no changes, so an empty list is
/// returned rather than an error.
pub fn load_records(path: &Path) -> SourceMapResult<Vec<TransformationRecord>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let records = parse_records(path, &content)?;
            debug!("Loaded {} transformation records from {}", records.len(), path.display());
            Ok(records)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No records file at {}, assuming identity transform", path.display());
            Ok(Vec::new())
        }
        Err(e) => Err(SourceMapError::io(path, e)),
    }
}
