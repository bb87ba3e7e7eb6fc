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

//! Error types for source map generation, loading and translation.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced by the source map subsystem.
///
/// Unmappable positions are deliberately absent: a position no entry covers
/// is translated by identity, never reported as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceMapError {
    /// No mapping table exists yet for the file.
    #[error("'{path}' has not been generated yet; run regeneration first")]
    NotGenerated {
        /// Generated file path whose sidecar is missing.
        path: PathBuf,
    },

    /// The persisted document was written by a newer schema.
    #[error(
        "mapping document '{path}' uses schema version {found}, but this build supports at most version {supported}; upgrade veneer"
    )]
    UnsupportedSchemaVersion {
        /// Sidecar document path.
        path: PathBuf,
        /// Version found in the document.
        found: u32,
        /// Maximum version this build understands.
        supported: u32,
    },

    /// The persisted document could not be parsed.
    #[error("mapping document '{path}' is malformed: {message}")]
    MalformedDocument {
        /// Sidecar document path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The generated file does not parse, so no ground truth is available.
    #[error("generated file '{path}' failed to parse at line {line}, column {column}")]
    GeneratedParse {
        /// Generated file path.
        path: PathBuf,
        /// 1-based line of the first syntax error.
        line: u32,
        /// 1-based column of the first syntax error.
        column: u32,
    },

    /// Filesystem failure.
    #[error("I/O error for '{path}': {message}")]
    Io {
        /// The file path that caused the error.
        path: PathBuf,
        /// The error message.
        message: String,
    },
}

impl SourceMapError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Returns `true` for errors that mean "regenerate and try again".
    ///
    /// A malformed sidecar is recovered exactly like a missing one.
    pub fn is_not_generated(&self) -> bool {
        matches!(
            self,
            Self::NotGenerated { .. } | Self::MalformedDocument { .. }
        )
    }
}

/// Result type for source map operations.
pub type SourceMapResult<T> = Result<T, SourceMapError>;
