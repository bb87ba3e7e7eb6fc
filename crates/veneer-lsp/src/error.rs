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

//! Error types for the protocol bridge.

use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tower_lsp::jsonrpc::{Error as RpcError, ErrorCode};
use veneer_sourcemap::SourceMapError;

/// Protocol bridge error type.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Mapping lookup or generation failed.
    #[error(transparent)]
    SourceMap(#[from] SourceMapError),

    /// The analysis tool exhausted its restart budget.
    #[error(
        "analysis tool is unavailable after {restarts} restarts; run '{}' to try again",
        crate::constants::RESTART_COMMAND
    )]
    Degraded {
        /// Restarts used before giving up.
        restarts: u32,
    },

    /// The analysis tool went away while a request was in flight.
    #[error("analysis tool exited: {0}")]
    SubprocessCrashed(String),

    /// The analysis tool could not be started.
    #[error("failed to start '{command}': {message}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// OS error text.
        message: String,
    },

    /// Malformed traffic or a call in the wrong lifecycle phase.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The analysis tool answered with an error.
    #[error("analysis tool error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// A request to the analysis tool did not complete in time.
    #[error("request '{method}' timed out after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    /// The transform command or mapping generation failed.
    #[error("regeneration of '{path}' failed: {message}")]
    RegenerationFailed {
        /// Surface file being regenerated.
        path: PathBuf,
        /// Transform output or generator error.
        message: String,
    },

    /// The transform command was killed after the timeout.
    #[error("regeneration of '{path}' timed out after {seconds}s")]
    RegenerationTimeout { path: PathBuf, seconds: u64 },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// JSON-RPC error code reported to the editor.
    pub fn code(&self) -> i64 {
        match self {
            Self::SourceMap(SourceMapError::NotGenerated { .. }) => -32001,
            Self::SourceMap(SourceMapError::UnsupportedSchemaVersion { .. }) => -32002,
            Self::SourceMap(_) => -32003,
            Self::Degraded { .. } => -32010,
            Self::SubprocessCrashed(_) => -32011,
            Self::Spawn { .. } => -32012,
            Self::Protocol(_) => -32600,
            Self::Remote { code, .. } => *code,
            // LSP RequestCancelled; the editor may retry.
            Self::Timeout { .. } => -32800,
            Self::RegenerationFailed { .. } => -32020,
            Self::RegenerationTimeout { .. } => -32021,
            Self::Io(_) => -32004,
            Self::Json(_) => -32700,
        }
    }

    /// Returns `true` if the editor should be told with a visible message.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Degraded { .. }
                | Self::Spawn { .. }
                | Self::SourceMap(SourceMapError::UnsupportedSchemaVersion { .. })
        )
    }
}

impl From<BridgeError> for RpcError {
    fn from(err: BridgeError) -> Self {
        let code = ErrorCode::from(err.code());
        match err {
            BridgeError::Remote { message, data, .. } => RpcError {
                code,
                message: message.into(),
                data,
            },
            other => RpcError {
                code,
                message: other.to_string().into(),
                data: None,
            },
        }
    }
}
