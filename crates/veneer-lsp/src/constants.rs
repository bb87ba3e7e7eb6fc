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

//! Bridge constants and magic number definitions.
//!
//! This module centralizes the tuning values used throughout the bridge with
//! the rationale for each value.
//!
//! # Organization
//!
//! - **Timing**: debounce and timeout windows
//! - **Supervision**: analysis tool restart budget
//! - **Commands**: external programs and placeholders
//! - **LSP Protocol**: protocol-specific values

// ============================================================================
// Timing
// ============================================================================

/// Debounce window for regeneration triggers (in milliseconds).
///
/// **Rationale**: editors often emit several saves in a burst (format-on-save,
/// save-all, watcher echo of the editor's own write). 500ms collapses such a
/// burst into one regeneration while still feeling immediate after a manual
/// save.
///
/// **Trade-offs**:
/// - Lower values regenerate more often and may run the transform twice per save
/// - Higher values delay fresh diagnostics noticeably
pub const DEBOUNCE_MS: u64 = 500;

/// Upper bound for one run of the transform command (in seconds).
///
/// **Rationale**: the transform is an external process and may hang on
/// pathological input. After 30s it is killed and the failure is reported as
/// a diagnostic; the previous mapping table stays in use.
pub const REGENERATION_TIMEOUT_SECS: u64 = 30;

/// Upper bound for one request to the analysis tool (in seconds).
///
/// **Rationale**: a request that never completes would pin editor-side
/// state forever. 60s leaves room for first-time workspace loading in large
/// Go modules.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Supervision
// ============================================================================

/// Restarts allowed before the analysis tool is considered failed.
///
/// **Rationale**: a crash loop (bad toolchain, broken module) must not spin
/// forever. After three restarts the bridge degrades and requests fail fast
/// until the user runs the restart command, which resets the budget.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

// ============================================================================
// Commands
// ============================================================================

/// Analysis tool started when nothing is configured.
pub const DEFAULT_ANALYSIS_COMMAND: &str = "gopls";

/// Transform command started when nothing is configured.
pub const DEFAULT_TRANSFORM_COMMAND: &str = "veneer";

/// Default transform arguments.
pub const DEFAULT_TRANSFORM_ARGS: &[&str] = &["build", SURFACE_PLACEHOLDER, "-o", GENERATED_PLACEHOLDER];

/// Replaced with the surface file path in transform arguments.
pub const SURFACE_PLACEHOLDER: &str = "{surface}";

/// Replaced with the generated file path in transform arguments.
pub const GENERATED_PLACEHOLDER: &str = "{generated}";

/// Workspace command regenerating one file (or every open file).
pub const REGENERATE_COMMAND: &str = "veneer.regenerate";

/// Workspace command resetting the restart budget and restarting the tool.
pub const RESTART_COMMAND: &str = "veneer.restartAnalysisTool";

// ============================================================================
// LSP Protocol Constants
// ============================================================================

/// Key under `initializationOptions` holding bridge settings.
///
/// The key is stripped before the options are forwarded to the analysis tool.
pub const INITIALIZATION_OPTIONS_KEY: &str = "veneer";

/// Language id used when opening generated documents in the analysis tool.
pub const GENERATED_LANGUAGE_ID: &str = "go";

/// `source` field of diagnostics produced by the bridge itself.
pub const DIAGNOSTIC_SOURCE: &str = "veneer";

/// Maximum character position for regeneration diagnostic ranges.
///
/// **Rationale**: transform errors report a start column only. Editors clamp
/// the end to the actual line length.
pub const DIAGNOSTIC_LINE_END_CHAR: u32 = 1000;

/// Bytes per megabyte (1024 * 1024).
pub const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

/// Largest framed message accepted from the analysis tool.
///
/// **Rationale**: a corrupt `Content-Length` header must not make the bridge
/// allocate unbounded memory. Real responses (workspace symbols in large
/// modules) stay well below 64 MB.
pub const MAX_MESSAGE_SIZE: usize = 64 * BYTES_PER_MEGABYTE;

/// `FileChangeType.Changed` in `workspace/didChangeWatchedFiles`.
pub const FILE_CHANGE_TYPE_CHANGED: u32 = 2;

/// Event coalescing of the workspace file watcher (in milliseconds).
///
/// Kept short: watcher events feed the regeneration debouncer, which
/// applies the real window.
pub const WATCHER_COALESCE_MS: u64 = 100;
