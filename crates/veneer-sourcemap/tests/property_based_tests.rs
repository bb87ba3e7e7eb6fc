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

//! Property-based tests for generation and translation invariants.
//!
//! Programs are synthesized as a function body of simple assignments; a random
//! subset uses error propagation, which expands into five generated lines.

use proptest::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_lsp::lsp_types::Position;
use veneer_sourcemap::text::line_char_len;
use veneer_sourcemap::*;

/// Lines contributed by one expansion beyond the surface line itself.
const EXPANSION_EXTRA: u32 = 4;

/// First body line in both files.
const BODY_START: u32 = 4;

struct Program {
    surface: String,
    generated: String,
    records: Vec<TransformationRecord>,
}

fn synthesize(transformed: &[bool]) -> Program {
    let mut surface = String::from("package main\n\nfunc run() error {\n");
    let mut generated = surface.clone();
    let mut records = Vec::new();

    for (i, &expand) in transformed.iter().enumerate() {
        if expand {
            let text = format!("v{i} = load{i}()?");
            surface.push_str(&format!("\t{text}\n"));
            generated.push_str(&format!(
                "\tv{i}, err := load{i}()\n\tif err != nil {{\n\t\treturn err\n\t}}\n\t// veneer:e{i:03}\n"
            ));
            records.push(TransformationRecord::new(
                BODY_START + i as u32,
                2,
                text.chars().count() as u32,
                format!("veneer:e{i:03}"),
                "error_prop",
            ));
        } else {
            surface.push_str(&format!("\tv{i} = {i}\n"));
            generated.push_str(&format!("\tv{i} = {i}\n"));
        }
    }

    let tail = "\treturn nil\n}\n";
    surface.push_str(tail);
    generated.push_str(tail);
    Program {
        surface,
        generated,
        records,
    }
}

fn generate(program: &Program) -> GeneratorOutput {
    MappingGenerator::new()
        .generate(GeneratorInput {
            surface_path: Path::new("/w/main.vnr"),
            surface_text: &program.surface,
            generated_path: Path::new("/w/main.go"),
            generated_text: &program.generated,
            records: &program.records,
        })
        .unwrap()
}

struct Docs(HashMap<PathBuf, String>);

impl TableSource for Docs {
    fn read(&self, path: &Path) -> std::io::Result<Option<String>> {
        Ok(self.0.get(path).cloned())
    }
}

struct Lines(HashMap<PathBuf, Vec<u32>>);

impl LineSource for Lines {
    fn line_lengths(&self, path: &Path) -> Option<Vec<u32>> {
        self.0.get(path).cloned()
    }
}

fn lengths(text: &str) -> Vec<u32> {
    text.lines().map(|l| line_char_len(l) as u32).collect()
}

fn translator(program: &Program, table: &MappingTable) -> PositionTranslator {
    let scheme = PathScheme::default();
    let mut docs = HashMap::new();
    docs.insert(
        scheme.map_path(Path::new("/w/main.go")),
        table.to_json().unwrap(),
    );
    let store = Arc::new(MappingStore::new(Docs(docs), SystemClock, scheme));

    let mut lines = HashMap::new();
    lines.insert(PathBuf::from("/w/main.vnr"), lengths(&program.surface));
    lines.insert(PathBuf::from("/w/main.go"), lengths(&program.generated));
    PositionTranslator::with_line_source(store, Lines(lines))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Every body line lands exactly where the expansions before it push it.
    #[test]
    fn prop_lines_shift_by_preceding_expansions(
        transformed in prop::collection::vec(any::<bool>(), 1..24)
    ) {
        let program = synthesize(&transformed);
        let output = generate(&program);
        prop_assert!(output.report.is_clean(), "{:?}", output.report);

        let mut shift = 0;
        for (i, &expand) in transformed.iter().enumerate() {
            let line = BODY_START + i as u32;
            let entry = output.table.find_by_original(line, 2);
            prop_assert!(entry.is_some(), "line {} unmapped", line);
            let entry = entry.unwrap();
            prop_assert_eq!(entry.generated_line, line + shift);
            prop_assert_eq!(entry.is_identity(), !expand);
            if expand {
                shift += EXPANSION_EXTRA;
            }
        }
    }

    // Identity entries never go backwards in the generated file.
    #[test]
    fn prop_identity_entries_are_monotonic(
        transformed in prop::collection::vec(any::<bool>(), 1..24)
    ) {
        let output = generate(&synthesize(&transformed));
        let mut identity: Vec<&MappingEntry> =
            output.table.entries().iter().filter(|e| e.is_identity()).collect();
        identity.sort_by_key(|e| e.original_line);
        for pair in identity.windows(2) {
            prop_assert!(pair[0].generated_line < pair[1].generated_line);
        }
    }

    // Positions inside mapped spans survive a round trip.
    #[test]
    fn prop_round_trip_inside_spans(
        transformed in prop::collection::vec(any::<bool>(), 1..16),
        pick in any::<prop::sample::Index>(),
        offset in 0u32..8,
    ) {
        let program = synthesize(&transformed);
        let output = generate(&program);
        let translator = translator(&program, &output.table);

        let line = BODY_START + pick.index(transformed.len()) as u32;
        let entry = output.table.find_by_original(line, 2).unwrap();
        let column = 2 + offset % entry.length.max(1);
        let start = Position { line: line - 1, character: column - 1 };

        let there = translator
            .translate_position(Path::new("/w/main.vnr"), start, Direction::SurfaceToGenerated)
            .unwrap();
        let back = translator
            .translate_position(&there.path, there.position, Direction::GeneratedToSurface)
            .unwrap();
        prop_assert_eq!(back.position, start);
    }

    // Arbitrary generated positions translate without error and stay on a real column.
    #[test]
    fn prop_translation_is_total_and_clamped(
        transformed in prop::collection::vec(any::<bool>(), 1..16),
        line in 0u32..200,
        character in 0u32..200,
    ) {
        let program = synthesize(&transformed);
        let output = generate(&program);
        let translator = translator(&program, &output.table);

        let out = translator
            .translate_position(
                Path::new("/w/main.go"),
                Position { line, character },
                Direction::GeneratedToSurface,
            )
            .unwrap();
        prop_assert_eq!(out.path, PathBuf::from("/w/main.vnr"));
        if let Some(len) = lengths(&program.surface).get(out.position.line as usize) {
            prop_assert!(out.position.character <= *len);
        }
    }
}
