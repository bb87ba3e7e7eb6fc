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

//! Mapping table generation.
//!
//! The generator combines three inputs:
//!
//! - the surface file text,
//! - the final generated Go file, parsed for ground-truth positions,
//! - the transformation records emitted by the transform stage.
//!
//! # Algorithm
//!
//! 1. **Transformation matching**: each record's marker is located among the
//!    generated file's comments. From the marker the generator walks backward
//!    to the nearest preceding statement, preferring an assignment, then an
//!    expression statement, then any other statement. The walk stops at the
//!    copy of the untouched surface line just above the record, so code that
//!    was merely carried over is never bound. Records whose marker is missing
//!    are skipped and reported.
//! 2. **Identity matching**: every other non-blank, non-comment surface line is
//!    mapped to its copy in the generated file. The expected generated line is
//!    the surface line plus the running line shift left by earlier
//!    transformations; the copy is verified by content and searched for
//!    nearby when it does not match.
//! 3. **Merge**: entries are sorted by generated position.
//!
//! A generated file that fails to parse fails generation outright.

use crate::error::SourceMapResult;
use crate::record::TransformationRecord;
use crate::syntax::{Comment, Statement, StatementKind, SyntaxIndex};
use crate::table::{MappingEntry, MappingTable, IDENTITY_NAME};
use crate::text::{first_non_whitespace, is_blank_or_comment, split_lines};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// How many lines above a marker a bound statement may start.
pub const DEFAULT_MARKER_LOOKBACK: u32 = 32;

/// How far from the expected line an identity copy is searched for.
pub const DEFAULT_DRIFT_WINDOW: u32 = 64;

/// Everything the generator reads.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorInput<'a> {
    pub surface_path: &'a Path,
    pub surface_text: &'a str,
    pub generated_path: &'a Path,
    pub generated_text: &'a str,
    pub records: &'a [TransformationRecord],
}

/// Quality information about one generation pass.
///
/// Missing markers and drifted lines do not fail generation; they are flagged
/// here so the transform stage can be fixed upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Records bound to a generated statement.
    pub transformations: usize,
    /// Markers that were not found in the generated file.
    pub missing_markers: Vec<String>,
    /// Identity entries emitted.
    pub identity_entries: usize,
    /// Surface lines whose copy could not be verified in the generated file.
    pub drifted_lines: Vec<u32>,
}

impl GenerationReport {
    /// Returns `true` when every record matched and every copied line was verified.
    pub fn is_clean(&self) -> bool {
        self.missing_markers.is_empty() && self.drifted_lines.is_empty()
    }
}

/// Result of a generation pass.
#[derive(Debug, Clone)]
pub struct GeneratorOutput {
    pub table: MappingTable,
    pub report: GenerationReport,
}

/// Builds [`MappingTable`]s.
#[derive(Debug, Clone)]
pub struct MappingGenerator {
    marker_lookback: u32,
    drift_window: u32,
}

impl Default for MappingGenerator {
    fn default() -> Self {
        Self {
            marker_lookback: DEFAULT_MARKER_LOOKBACK,
            drift_window: DEFAULT_DRIFT_WINDOW,
        }
    }
}

/// A record bound to a generated position.
struct Binding<'r> {
    record: &'r TransformationRecord,
    marker_line: u32,
    line: u32,
    column: u32,
}

impl MappingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the marker lookback window.
    pub fn with_marker_lookback(mut self, lines: u32) -> Self {
        self.marker_lookback = lines;
        self
    }

    /// Override the identity search window.
    pub fn with_drift_window(mut self, lines: u32) -> Self {
        self.drift_window = lines;
        self
    }

    /// Generate a complete mapping table.
    pub fn generate(&self, input: GeneratorInput<'_>) -> SourceMapResult<GeneratorOutput> {
        let index = SyntaxIndex::parse(input.generated_path, input.generated_text)?;
        let mut report = GenerationReport::default();

        let bindings = self.match_transformations(&index, input, &mut report);

        let mut entries: Vec<MappingEntry> = bindings
            .iter()
            .map(|b| MappingEntry {
                original_line: b.record.original_line,
                original_column: b.record.original_column,
                generated_line: b.line,
                generated_column: b.column,
                length: b.record.original_length,
                name: b.record.kind.clone(),
            })
            .collect();
        report.transformations = entries.len();

        // Generated line of the last marker for each transformed surface line.
        let mut anchors: BTreeMap<u32, u32> = BTreeMap::new();
        for b in &bindings {
            let slot = anchors.entry(b.record.original_line).or_insert(b.marker_line);
            *slot = (*slot).max(b.marker_line);
        }

        let identity = self.match_identity(input, &anchors, &mut report);
        report.identity_entries = identity.len();
        entries.extend(identity);

        let table = MappingTable::new(input.surface_path, input.generated_path, entries);

        if !report.missing_markers.is_empty() {
            warn!(
                "{} transformation marker(s) missing in {}: {:?}",
                report.missing_markers.len(),
                input.generated_path.display(),
                report.missing_markers
            );
        }
        if !report.drifted_lines.is_empty() {
            warn!(
                "{} surface line(s) of {} could not be verified in {} (lines {:?})",
                report.drifted_lines.len(),
                input.surface_path.display(),
                input.generated_path.display(),
                report.drifted_lines
            );
        }
        info!(
            "Generated mapping for {}: {} transformation and {} identity entries",
            input.generated_path.display(),
            report.transformations,
            report.identity_entries
        );

        Ok(GeneratorOutput { table, report })
    }

    fn match_transformations<'r>(
        &self,
        index: &SyntaxIndex,
        input: GeneratorInput<'r>,
        report: &mut GenerationReport,
    ) -> Vec<Binding<'r>> {
        let records = input.records;
        let comments = index.comments();
        let mut claimed = vec![false; comments.len()];
        let mut found: Vec<(&'r TransformationRecord, usize)> = Vec::new();

        for record in records {
            let hit = comments
                .iter()
                .enumerate()
                .find(|(i, c)| !claimed[*i] && c.text.contains(&record.generated_marker));
            match hit {
                Some((i, _)) => {
                    claimed[i] = true;
                    found.push((record, i));
                }
                None => {
                    debug!(
                        "Marker {:?} for surface line {} not found, skipping record",
                        record.generated_marker, record.original_line
                    );
                    report.missing_markers.push(record.generated_marker.clone());
                }
            }
        }

        // Statements at or before an earlier marker belong to that transformation.
        let mut marker_positions: Vec<(u32, u32)> = found
            .iter()
            .map(|&(_, i)| (comments[i].line, comments[i].column))
            .collect();
        marker_positions.sort_unstable();

        let copied = self.copied_floors(input, &found, comments);

        found
            .into_iter()
            .zip(copied)
            .map(|((record, i), copied)| {
                let marker = &comments[i];
                let here = (marker.line, marker.column);
                let earlier_marker = marker_positions
                    .partition_point(|&p| p < here)
                    .checked_sub(1)
                    .map(|k| marker_positions[k]);
                // Statements on or above the copy of the preceding untouched line
                // are not part of this transformation.
                let floor = earlier_marker.max(copied.map(|line| (line, u32::MAX)));
                let (line, column) = match self.bind_statement(index.statements(), marker, floor) {
                    Some(stmt) => (stmt.line, stmt.column),
                    None => {
                        debug!(
                            "No statement precedes marker {:?} at {}:{}, binding to the marker",
                            record.generated_marker, marker.line, marker.column
                        );
                        here
                    }
                };
                Binding {
                    record,
                    marker_line: marker.line,
                    line,
                    column,
                }
            })
            .collect()
    }

    /// Generated line holding the copy of the untouched surface line just
    /// above each record, in the order of `found`.
    ///
    /// The copy is looked for where the running line shift predicts it, as in
    /// identity matching, and must lie above the record's marker. `None` when
    /// the previous code line is itself transformed or no copy is verified.
    fn copied_floors(
        &self,
        input: GeneratorInput<'_>,
        found: &[(&TransformationRecord, usize)],
        comments: &[Comment],
    ) -> Vec<Option<u32>> {
        let surface_lines = split_lines(input.surface_text);
        let generated_lines = split_lines(input.generated_text);

        let mut order: Vec<usize> = (0..found.len()).collect();
        order.sort_by_key(|&k| {
            let (record, i) = found[k];
            (record.original_line, comments[i].line, comments[i].column)
        });

        let mut floors = vec![None; found.len()];
        let mut delta: i64 = 0;
        let mut previous_original: u32 = 0;
        let mut previous_marker: i64 = 0;

        for k in order {
            let (record, i) = found[k];
            let marker_line = comments[i].line as i64;

            let preceding = (previous_original + 1..record.original_line)
                .rev()
                .find(|&n| {
                    surface_lines
                        .get((n - 1) as usize)
                        .is_some_and(|l| !is_blank_or_comment(l))
                });
            if let Some(line_no) = preceding {
                let wanted = surface_lines[(line_no - 1) as usize].trim();
                let expected = line_no as i64 + delta;
                floors[k] = self
                    .locate(
                        &generated_lines,
                        wanted,
                        expected,
                        previous_marker + 1,
                        marker_line,
                    )
                    .map(|g| g as u32);
            }

            delta = marker_line - record.original_line as i64;
            previous_original = record.original_line;
            previous_marker = previous_marker.max(marker_line);
        }

        floors
    }

    /// Walk backward from a marker and pick the statement the transformation produced.
    fn bind_statement<'s>(
        &self,
        statements: &'s [Statement],
        marker: &Comment,
        floor: Option<(u32, u32)>,
    ) -> Option<&'s Statement> {
        let here = (marker.line, marker.column);
        let min_line = marker.line.saturating_sub(self.marker_lookback);
        let candidates: Vec<&Statement> = statements
            .iter()
            .filter(|s| (s.line, s.column) < here)
            .filter(|s| floor.map_or(true, |f| (s.line, s.column) > f))
            .filter(|s| s.line >= min_line)
            .collect();

        [
            StatementKind::Assignment,
            StatementKind::Expression,
            StatementKind::Other,
        ]
        .into_iter()
        .find_map(|kind| {
            candidates
                .iter()
                .filter(|s| s.kind == kind)
                .max_by_key(|s| (s.line, s.column))
                .copied()
        })
    }

    fn match_identity(
        &self,
        input: GeneratorInput<'_>,
        anchors: &BTreeMap<u32, u32>,
        report: &mut GenerationReport,
    ) -> Vec<MappingEntry> {
        let surface_lines = split_lines(input.surface_text);
        let generated_lines = split_lines(input.generated_text);

        let mut entries = Vec::new();
        let mut delta: i64 = 0;
        // Copied lines keep their relative order, so matches only move forward.
        let mut floor: i64 = 1;

        for (idx, line) in surface_lines.iter().enumerate() {
            let line_no = idx as u32 + 1;

            if let Some(&marker_line) = anchors.get(&line_no) {
                delta = marker_line as i64 - line_no as i64;
                floor = floor.max(marker_line as i64 + 1);
                continue;
            }
            if is_blank_or_comment(line) {
                continue;
            }

            let Some(original_col) = first_non_whitespace(line) else {
                continue;
            };
            let wanted = line.trim();
            let expected = (line_no as i64 + delta).max(floor);

            let generated_line = match self.locate(&generated_lines, wanted, expected, floor, i64::MAX)
            {
                Some(found) => {
                    delta = found - line_no as i64;
                    found
                }
                None => {
                    report.drifted_lines.push(line_no);
                    expected
                }
            };
            floor = floor.max(generated_line + 1);

            let generated_col = generated_lines
                .get((generated_line - 1) as usize)
                .and_then(|l| first_non_whitespace(l))
                .unwrap_or(original_col);

            entries.push(MappingEntry {
                original_line: line_no,
                original_column: original_col as u32 + 1,
                generated_line: generated_line as u32,
                generated_column: generated_col as u32 + 1,
                length: wanted.chars().count() as u32,
                name: IDENTITY_NAME.to_string(),
            });
        }

        entries
    }

    /// Find the 1-based generated line holding `wanted` in `floor..ceiling`,
    /// trying the expected line first, then searching outward (forward first)
    /// within the window.
    fn locate(
        &self,
        lines: &[&str],
        wanted: &str,
        expected: i64,
        floor: i64,
        ceiling: i64,
    ) -> Option<i64> {
        let matches = |n: i64| -> bool {
            n >= floor
                && n < ceiling
                && n >= 1
                && lines
                    .get((n - 1) as usize)
                    .is_some_and(|l| l.trim() == wanted)
        };

        if matches(expected) {
            return Some(expected);
        }
        (1..=self.drift_window as i64).find_map(|k| {
            if matches(expected + k) {
                Some(expected + k)
            } else if matches(expected - k) {
                Some(expected - k)
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(
        surface: &str,
        generated: &str,
        records: &[TransformationRecord],
    ) -> GeneratorOutput {
        MappingGenerator::new()
            .generate(GeneratorInput {
                surface_path: Path::new("/w/main.vnr"),
                surface_text: surface,
                generated_path: Path::new("/w/main.go"),
                generated_text: generated,
                records,
            })
            .unwrap()
    }

    #[test]
    fn test_identity_only_file() {
        let src = "package main\n\n// greet prints\nfunc greet() {\n\tprintln(\"hi\")\n}\n";
        let out = generate(src, src, &[]);

        assert!(out.report.is_clean());
        let lines: Vec<u32> = out.table.entries().iter().map(|e| e.original_line).collect();
        assert_eq!(lines, vec![1, 4, 5, 6]);
        for e in out.table.entries() {
            assert_eq!(e.original_line, e.generated_line);
            assert_eq!(e.original_column, e.generated_column);
            assert!(e.is_identity());
        }
        let body = out.table.find_by_original(5, 2).unwrap();
        assert_eq!(body.length, "println(\"hi\")".len() as u32);
    }

    #[test]
    fn test_assignment_preferred_over_nearer_expression() {
        let surface = "package main\n\nfunc f() {\n\tv := compute()?\n}\n";
        let generated = "package main

func f() {
\tv, err := compute()
\tlog(err)
\t// veneer:p0
}
";
        let records = [TransformationRecord::new(4, 2, 14, "// veneer:p0", "error_prop")];
        let out = generate(surface, generated, &records);
        let entry = out.table.find_by_original(4, 2).unwrap();
        assert_eq!((entry.generated_line, entry.generated_column), (4, 2));
        assert_eq!(entry.name, "error_prop");
    }

    #[test]
    fn test_expression_preferred_over_other() {
        let surface = "package main\n\nfunc f() {\n\tcall()!\n}\n";
        let generated = "package main

func f() {
\tcall()
\tif true {
\t\treturn
\t} // veneer:x
}
";
        let records = [TransformationRecord::new(4, 2, 7, "veneer:x", "must")];
        let out = generate(surface, generated, &records);
        let entry = out.table.find_by_original(4, 2).unwrap();
        assert_eq!(entry.generated_line, 4);
    }

    #[test]
    fn test_missing_marker_is_skipped_but_line_still_covered() {
        let src = "package main\n\nvar x = 1\n";
        let records = [TransformationRecord::new(3, 1, 9, "// veneer:gone", "A")];
        let out = generate(src, src, &records);

        assert_eq!(out.report.missing_markers, vec!["// veneer:gone".to_string()]);
        assert_eq!(out.report.transformations, 0);
        let entry = out.table.find_by_original(3, 1).unwrap();
        assert!(entry.is_identity());
    }

    #[test]
    fn test_earlier_marker_bounds_backward_walk() {
        let surface = "package main\n\nfunc f() {\n\ta := one()?\n\tprint(a)!\n}\n";
        let generated = "package main

func f() {
\ta, err := one() // veneer:m0
\tprint(a) // veneer:m1
}
";
        let records = [
            TransformationRecord::new(4, 2, 10, "veneer:m0", "A"),
            TransformationRecord::new(5, 2, 9, "veneer:m1", "B"),
        ];
        let out = generate(surface, generated, &records);
        // The assignment on line 4 belongs to m0; m1 must fall back to its expression.
        assert_eq!(out.table.find_by_original(5, 2).unwrap().generated_line, 5);
        assert_eq!(out.table.find_by_original(4, 2).unwrap().generated_line, 4);
    }

    #[test]
    fn test_untouched_assignment_above_is_not_bound() {
        let surface = "package main\n\nfunc f() {\n\tx := 1\n\tcall()!\n}\n";
        let generated = "package main

func f() {
\tx := 1
\tcall() // veneer:m0
}
";
        let records = [TransformationRecord::new(5, 2, 7, "veneer:m0", "must")];
        let out = generate(surface, generated, &records);
        let entry = out.table.find_by_original(5, 2).unwrap();
        assert_eq!((entry.generated_line, entry.generated_column), (5, 2));
        assert_eq!(entry.name, "must");
        assert_eq!(out.table.find_by_original(4, 2).unwrap().generated_line, 4);
    }

    #[test]
    fn test_untouched_assignment_above_shifted_expansion() {
        let surface = "package main\n\nfunc f() {\n\tv := a()?\n\ty := 2\n\tlog(y)!\n}\n";
        let generated = "package main

func f() {
\tv, err := a()
\tif err != nil {
\t\treturn
\t} // veneer:p0
\ty := 2
\tlog(y)
\tif false {
\t} // veneer:p1
}
";
        let records = [
            TransformationRecord::new(4, 2, 8, "veneer:p0", "error_prop"),
            TransformationRecord::new(6, 2, 7, "veneer:p1", "must"),
        ];
        let out = generate(surface, generated, &records);
        assert_eq!(out.table.find_by_original(4, 2).unwrap().generated_line, 4);
        assert_eq!(out.table.find_by_original(5, 2).unwrap().generated_line, 8);
        // `y := 2` is a copied line, so the expression below it wins.
        let entry = out.table.find_by_original(6, 2).unwrap();
        assert_eq!((entry.generated_line, entry.name.as_str()), (9, "must"));
    }

    #[test]
    fn test_generated_parse_failure_is_fatal() {
        let result = MappingGenerator::new().generate(GeneratorInput {
            surface_path: Path::new("a.vnr"),
            surface_text: "package main\n",
            generated_path: Path::new("a.go"),
            generated_text: "package main\nfunc {{{\n",
            records: &[],
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_unverifiable_line_is_reported() {
        let surface = "package main\n\nvar renamed = 1\n";
        let generated = "package main\n\nvar other = 1\n";
        let out = generate(surface, generated, &[]);
        assert_eq!(out.report.drifted_lines, vec![3]);
        // Still covered, at the expected line.
        assert_eq!(out.table.find_by_original(3, 1).unwrap().generated_line, 3);
    }
}
