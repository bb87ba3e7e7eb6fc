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

//! Regeneration pipeline: transform command, mapping generation, diagnostics.

use crate::config::BridgeConfig;
use crate::constants::{DIAGNOSTIC_LINE_END_CHAR, DIAGNOSTIC_SOURCE};
use crate::error::{BridgeError, BridgeResult};
use dashmap::DashMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};
use tracing::{debug, info, warn};
use veneer_sourcemap::{
    load_records, GenerationReport, GeneratorInput, MappingGenerator, MappingStore, MappingTable,
    PathScheme, SourceMapError,
};

/// Result of a successful regeneration.
#[derive(Debug, Clone)]
pub struct RegenerationOutcome {
    pub surface: PathBuf,
    pub generated: PathBuf,
    /// Text of the freshly written generated file.
    pub generated_text: String,
    pub table: Arc<MappingTable>,
    pub report: GenerationReport,
}

/// Runs the transform and rebuilds mapping tables.
pub struct Regenerator {
    command: String,
    config: BridgeConfig,
    timeout: Duration,
    store: Arc<MappingStore>,
    generator: MappingGenerator,
    locks: DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

impl Regenerator {
    pub fn new(config: &BridgeConfig, store: Arc<MappingStore>) -> Self {
        Self {
            command: config.transform_command.clone(),
            config: config.clone(),
            timeout: config.regeneration_timeout(),
            store,
            generator: MappingGenerator::new(),
            locks: DashMap::new(),
        }
    }

    pub fn scheme(&self) -> &PathScheme {
        self.store.scheme()
    }

    /// Regenerate one surface file.
    ///
    /// Runs of the same path are serialized. On failure the store is left
    /// untouched, so the previous table stays in use.
    pub async fn regenerate(&self, surface: &Path) -> BridgeResult<RegenerationOutcome> {
        let lock = self
            .locks
            .entry(surface.to_path_buf())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let start = Instant::now();
        let generated = self.scheme().generated_for(surface);
        self.run_transform(surface, &generated).await?;

        let surface_text = read_text(surface).await?;
        let generated_text = read_text(&generated).await?;
        let records_path = self.scheme().records_path(&generated);
        let map_path = self.scheme().map_path(&generated);

        let generator = self.generator.clone();
        let job = {
            let surface = surface.to_path_buf();
            let generated = generated.clone();
            let surface_text = surface_text.clone();
            let generated_text = generated_text.clone();
            move || {
                let records = load_records(&records_path)?;
                let output = generator.generate(GeneratorInput {
                    surface_path: &surface,
                    surface_text: &surface_text,
                    generated_path: &generated,
                    generated_text: &generated_text,
                    records: &records,
                })?;
                output.table.save(&map_path)?;
                Ok::<_, SourceMapError>(output)
            }
        };
        let output = tokio::task::spawn_blocking(job)
            .await
            .map_err(|e| BridgeError::RegenerationFailed {
                path: surface.to_path_buf(),
                message: format!("mapping generation aborted: {}", e),
            })??;

        if !output.report.is_clean() {
            warn!(
                "Mapping for {} is incomplete: missing markers {:?}, drifted lines {:?}",
                surface.display(),
                output.report.missing_markers,
                output.report.drifted_lines
            );
        }

        let table = self.store.insert(&generated, output.table);
        info!(
            "Regenerated {} in {:?} ({} transformations, {} identity entries)",
            surface.display(),
            start.elapsed(),
            output.report.transformations,
            output.report.identity_entries
        );

        Ok(RegenerationOutcome {
            surface: surface.to_path_buf(),
            generated,
            generated_text,
            table,
            report: output.report,
        })
    }

    async fn run_transform(&self, surface: &Path, generated: &Path) -> BridgeResult<()> {
        let args = self.config.transform_args_for(surface, generated);
        debug!("Running {} {:?}", self.command, args);

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::RegenerationFailed {
                path: surface.to_path_buf(),
                message: format!("failed to start '{}': {}", self.command, e),
            })?;

        // Dropping the child on timeout kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BridgeError::RegenerationTimeout {
                path: surface.to_path_buf(),
                seconds: self.timeout.as_secs(),
            })??;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut message = stderr.trim().to_string();
        if !stdout.trim().is_empty() {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(stdout.trim());
        }
        if message.is_empty() {
            message = format!("'{}' exited with {}", self.command, output.status);
        }
        Err(BridgeError::RegenerationFailed {
            path: surface.to_path_buf(),
            message,
        })
    }
}

async fn read_text(path: &Path) -> BridgeResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SourceMapError::io(path, e).into())
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(?P<file>[^:\n]+):(?P<line>\d+)(?::(?P<col>\d+))?:\s*(?P<msg>.+)$")
            .expect("valid diagnostic pattern")
    })
}

/// Turn transform error output into diagnostics for `surface`.
///
/// Lines shaped `file:line[:column]: message` that name the surface file
/// become diagnostics at that position. If none do, the whole text becomes a
/// single diagnostic at the top of the file.
pub fn parse_failure_diagnostics(surface: &Path, text: &str) -> Vec<Diagnostic> {
    let surface_name = surface.file_name();
    let mut diagnostics: Vec<Diagnostic> = location_pattern()
        .captures_iter(text)
        .filter(|caps| {
            let file = Path::new(caps["file"].trim());
            file == surface || (file.file_name().is_some() && file.file_name() == surface_name)
        })
        .filter_map(|caps| {
            let line: u32 = caps["line"].parse().ok()?;
            let column: u32 = caps
                .name("col")
                .and_then(|c| c.as_str().parse().ok())
                .unwrap_or(1);
            let start = Position::new(line.saturating_sub(1), column.saturating_sub(1));
            let end = Position::new(start.line, DIAGNOSTIC_LINE_END_CHAR.max(start.character));
            Some(error_diagnostic(Range::new(start, end), caps["msg"].trim()))
        })
        .collect();

    if diagnostics.is_empty() {
        let message = match text.trim() {
            "" => "regeneration failed".to_string(),
            trimmed => trimmed.to_string(),
        };
        let origin = Position::new(0, 0);
        diagnostics.push(error_diagnostic(Range::new(origin, origin), &message));
    }
    diagnostics
}

/// Diagnostics describing a failed regeneration.
pub fn diagnostics_for_error(surface: &Path, error: &BridgeError) -> Vec<Diagnostic> {
    match error {
        BridgeError::RegenerationFailed { message, .. } => {
            parse_failure_diagnostics(surface, message)
        }
        other => parse_failure_diagnostics(surface, &other.to_string()),
    }
}

fn error_diagnostic(range: Range, message: &str) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::ERROR),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: message.to_string(),
        ..Default::default()
    }
}
