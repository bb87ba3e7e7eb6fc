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

//! Mapping tables and their persisted sidecar document.
//!
//! A [`MappingTable`] is immutable once built. A change to the surface file
//! produces a whole new table; tables are never patched in place.
//!
//! # Document format
//!
//! ```json
//! {
//!   "version": 1,
//!   "originalFilePath": "/w/main.vnr",
//!   "generatedFilePath": "/w/main.go",
//!   "mappings": [
//!     {"originalLine": 4, "originalColumn": 2, "generatedLine": 9,
//!      "generatedColumn": 2, "length": 18, "name": "error_prop"}
//!   ]
//! }
//! ```

use crate::error::{SourceMapError, SourceMapResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Newest schema version this build reads and writes.
pub const MAX_SCHEMA_VERSION: u32 = 1;

/// Oldest schema version; documents without a version (or with `0`) are read as this.
pub const MIN_SCHEMA_VERSION: u32 = 1;

/// Entry name used for lines copied verbatim into the generated file.
pub const IDENTITY_NAME: &str = "identity";

/// One contiguous original span mapped to one contiguous generated span.
///
/// Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub original_line: u32,
    pub original_column: u32,
    pub generated_line: u32,
    pub generated_column: u32,
    pub length: u32,
    #[serde(default)]
    pub name: String,
}

impl MappingEntry {
    /// Returns `true` if the entry was produced for an untransformed line.
    pub fn is_identity(&self) -> bool {
        self.name == IDENTITY_NAME
    }

    fn original_contains(&self, line: u32, column: u32) -> bool {
        line == self.original_line && span_contains(self.original_column, self.length, column)
    }

    fn generated_contains(&self, line: u32, column: u32) -> bool {
        line == self.generated_line && span_contains(self.generated_column, self.length, column)
    }
}

fn span_contains(start: u32, length: u32, column: u32) -> bool {
    // Zero-length spans still anchor their start column.
    column >= start && column < start.saturating_add(length.max(1))
}

/// The persisted form of a mapping table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDocument {
    #[serde(default)]
    pub version: Option<u32>,
    pub original_file_path: PathBuf,
    pub generated_file_path: PathBuf,
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
}

/// Bidirectional correspondence between a surface file and its generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    schema_version: u32,
    original_file_path: PathBuf,
    generated_file_path: PathBuf,
    /// Sorted by `(generated_line, generated_column)`.
    entries: Vec<MappingEntry>,
    /// Indices into `entries`, sorted by `(original_line, original_column)`.
    by_original: Vec<usize>,
}

impl MappingTable {
    /// Build a table at the current schema version, sorting entries.
    pub fn new(
        original_file_path: impl Into<PathBuf>,
        generated_file_path: impl Into<PathBuf>,
        entries: Vec<MappingEntry>,
    ) -> Self {
        Self::with_version(
            MAX_SCHEMA_VERSION,
            original_file_path.into(),
            generated_file_path.into(),
            entries,
        )
    }

    fn with_version(
        schema_version: u32,
        original_file_path: PathBuf,
        generated_file_path: PathBuf,
        mut entries: Vec<MappingEntry>,
    ) -> Self {
        entries.sort_by_key(|e| (e.generated_line, e.generated_column, e.original_line));
        let mut by_original: Vec<usize> = (0..entries.len()).collect();
        by_original.sort_by_key(|&i| (entries[i].original_line, entries[i].original_column));
        Self {
            schema_version,
            original_file_path,
            generated_file_path,
            entries,
            by_original,
        }
    }

    /// Parse and validate a sidecar document.
    ///
    /// `path` is the sidecar path and only used for error messages.
    pub fn from_json(path: &Path, content: &str) -> SourceMapResult<Self> {
        let doc: MappingDocument =
            serde_json::from_str(content).map_err(|e| SourceMapError::MalformedDocument {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::from_document(path, doc)
    }

    /// Validate the schema version of a parsed document.
    pub fn from_document(path: &Path, doc: MappingDocument) -> SourceMapResult<Self> {
        let version = match doc.version {
            None | Some(0) => MIN_SCHEMA_VERSION,
            Some(v) if v > MAX_SCHEMA_VERSION => {
                return Err(SourceMapError::UnsupportedSchemaVersion {
                    path: path.to_path_buf(),
                    found: v,
                    supported: MAX_SCHEMA_VERSION,
                });
            }
            Some(v) => v,
        };
        Ok(Self::with_version(
            version,
            doc.original_file_path,
            doc.generated_file_path,
            doc.mappings,
        ))
    }

    /// Convert back to the persisted form.
    pub fn to_document(&self) -> MappingDocument {
        MappingDocument {
            version: Some(self.schema_version),
            original_file_path: self.original_file_path.clone(),
            generated_file_path: self.generated_file_path.clone(),
            mappings: self.entries.clone(),
        }
    }

    /// Serialize to the sidecar JSON format.
    pub fn to_json(&self) -> SourceMapResult<String> {
        serde_json::to_string_pretty(&self.to_document()).map_err(|e| SourceMapError::Io {
            path: self.generated_file_path.clone(),
            message: e.to_string(),
        })
    }

    /// Write the document atomically: a temporary file in the same directory is
    /// renamed over `path`, so readers never observe a half-written table.
    pub fn save(&self, path: &Path) -> SourceMapResult<()> {
        let json = self.to_json()?;
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| SourceMapError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| SourceMapError::io(path, e))?;
        debug!(
            "Saved mapping table for {} ({} entries) to {}",
            self.generated_file_path.display(),
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn original_file_path(&self) -> &Path {
        &self.original_file_path
    }

    pub fn generated_file_path(&self) -> &Path {
        &self.generated_file_path
    }

    /// Entries in generated order.
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry covering a 1-based generated position.
    ///
    /// When spans overlap the narrowest wins; among equally narrow spans the
    /// one starting latest wins.
    pub fn find_by_generated(&self, line: u32, column: u32) -> Option<&MappingEntry> {
        let start = self.entries.partition_point(|e| e.generated_line < line);
        self.entries[start..]
            .iter()
            .take_while(|e| e.generated_line == line)
            .filter(|e| e.generated_contains(line, column))
            .min_by_key(|e| (e.length, std::cmp::Reverse(e.generated_column)))
    }

    /// Entry covering a 1-based original (surface) position.
    pub fn find_by_original(&self, line: u32, column: u32) -> Option<&MappingEntry> {
        let start = self
            .by_original
            .partition_point(|&i| self.entries[i].original_line < line);
        self.by_original[start..]
            .iter()
            .map(|&i| &self.entries[i])
            .take_while(|e| e.original_line == line)
            .filter(|e| e.original_contains(line, column))
            .min_by_key(|e| (e.length, std::cmp::Reverse(e.original_column)))
    }

    /// Returns `true` if any entry starts on the given original line.
    pub fn covers_original_line(&self, line: u32) -> bool {
        let start = self
            .by_original
            .partition_point(|&i| self.entries[i].original_line < line);
        self.by_original
            .get(start)
            .is_some_and(|&i| self.entries[i].original_line == line)
    }
}
