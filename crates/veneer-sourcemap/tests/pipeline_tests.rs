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

//! End-to-end tests: generate, persist, load and translate.
//!
//! Fixture: surface line 4 uses error propagation, which the transform expands
//! into seven generated lines. Every line after it shifts by six.

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower_lsp::lsp_types::Position;
use veneer_sourcemap::*;

const SURFACE: &str = "package main

func run() error {
\tx := load()?
\tfmt.Println(x)
\treturn nil
}

func main() {
\trun()
}
";

const GENERATED: &str = "package main

func run() error {
\tx, err := load()
\tif err != nil {
\t\tlog(\"propagating\")
\t\treturn err
\t}
\t// error propagation for x
\t// veneer:e000
\tfmt.Println(x)
\treturn nil
}

func main() {
\trun()
}
";

struct Fixture {
    _dir: TempDir,
    surface: PathBuf,
    generated: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let surface = dir.path().join("main.vnr");
    let generated = dir.path().join("main.go");
    fs::write(&surface, SURFACE).unwrap();
    fs::write(&generated, GENERATED).unwrap();

    let scheme = PathScheme::default();
    let records = vec![TransformationRecord::new(4, 2, 11, "veneer:e000", "error_prop")];
    fs::write(
        scheme.records_path(&generated),
        serde_json::to_string(&records).unwrap(),
    )
    .unwrap();

    Fixture {
        _dir: dir,
        surface,
        generated,
    }
}

fn generate(fx: &Fixture) -> GeneratorOutput {
    let scheme = PathScheme::default();
    let records = load_records(&scheme.records_path(&fx.generated)).unwrap();
    let output = MappingGenerator::new()
        .generate(GeneratorInput {
            surface_path: &fx.surface,
            surface_text: SURFACE,
            generated_path: &fx.generated,
            generated_text: GENERATED,
            records: &records,
        })
        .unwrap();
    output.table.save(&scheme.map_path(&fx.generated)).unwrap();
    output
}

fn translator() -> PositionTranslator {
    PositionTranslator::new(Arc::new(MappingStore::with_defaults()))
}

#[test]
fn test_lines_after_expansion_shift_by_six() {
    let fx = fixture();
    let output = generate(&fx);
    assert!(output.report.is_clean(), "{:?}", output.report);

    let entry = output.table.find_by_original(10, 5).unwrap();
    assert!(entry.is_identity());
    assert_eq!(entry.generated_line, 16);

    let out = translator()
        .translate_position(
            &fx.surface,
            Position {
                line: 9,
                character: 4,
            },
            Direction::SurfaceToGenerated,
        )
        .unwrap();
    assert_eq!(out.path, fx.generated);
    assert_eq!(
        out.position,
        Position {
            line: 15,
            character: 4
        }
    );
}

#[test]
fn test_transformation_binds_to_assignment() {
    let fx = fixture();
    let output = generate(&fx);
    let entry = output.table.find_by_original(4, 2).unwrap();
    assert_eq!(entry.name, "error_prop");
    assert_eq!((entry.generated_line, entry.generated_column), (4, 2));
    assert_eq!(entry.length, 11);
}

#[test]
fn test_every_code_line_is_covered() {
    let fx = fixture();
    let output = generate(&fx);
    for (idx, line) in SURFACE.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx as u32 + 1;
        assert!(
            output.table.covers_original_line(line_no),
            "surface line {} is not mapped",
            line_no
        );
    }
}

#[test]
fn test_identity_positions_round_trip() {
    let fx = fixture();
    let output = generate(&fx);
    let translator = translator();

    for entry in output.table.entries().iter().filter(|e| e.is_identity()) {
        for offset in 0..entry.length {
            let start = Position {
                line: entry.original_line - 1,
                character: entry.original_column - 1 + offset,
            };
            let there = translator
                .translate_position(&fx.surface, start, Direction::SurfaceToGenerated)
                .unwrap();
            assert!(there.mapped);
            let back = translator
                .translate_position(&there.path, there.position, Direction::GeneratedToSurface)
                .unwrap();
            assert_eq!(back.path, fx.surface);
            assert_eq!(back.position, start, "round trip of {:?}", start);
        }
    }
}

#[test]
fn test_sidecar_document_layout() {
    let fx = fixture();
    generate(&fx);
    let raw = fs::read_to_string(PathScheme::default().map_path(&fx.generated)).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["originalFilePath"], json!(fx.surface));
    assert!(doc["mappings"].as_array().unwrap().iter().any(|m| m["name"] == "error_prop"
        && m["originalLine"] == 4
        && m["generatedLine"] == 4));
}

#[test]
fn test_newer_schema_is_rejected_with_upgrade_hint() {
    let fx = fixture();
    let doc = json!({
        "version": MAX_SCHEMA_VERSION + 1,
        "originalFilePath": fx.surface,
        "generatedFilePath": fx.generated,
        "mappings": []
    });
    fs::write(
        PathScheme::default().map_path(&fx.generated),
        doc.to_string(),
    )
    .unwrap();

    let err = translator()
        .translate_position(
            &fx.surface,
            Position {
                line: 0,
                character: 0,
            },
            Direction::SurfaceToGenerated,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SourceMapError::UnsupportedSchemaVersion { found: 2, supported: 1, .. }
    ));
    assert!(err.to_string().contains("upgrade"));
}

#[test]
fn test_surface_file_without_sidecar() {
    let fx = fixture();
    let err = translator()
        .translate_position(
            &fx.surface,
            Position {
                line: 0,
                character: 0,
            },
            Direction::SurfaceToGenerated,
        )
        .unwrap_err();
    assert_eq!(
        err,
        SourceMapError::NotGenerated {
            path: fx.generated.clone()
        }
    );
}

#[test]
fn test_references_payload_translated_back_to_surface() {
    let fx = fixture();
    generate(&fx);
    let generated_uri = tower_lsp::lsp_types::Url::from_file_path(&fx.generated).unwrap();
    let surface_uri = tower_lsp::lsp_types::Url::from_file_path(&fx.surface).unwrap();

    let mut locations = json!([
        {
            "uri": generated_uri.as_str(),
            "range": {"start": {"line": 3, "character": 1}, "end": {"line": 3, "character": 2}}
        },
        {
            "uri": generated_uri.as_str(),
            "range": {"start": {"line": 10, "character": 13}, "end": {"line": 10, "character": 14}}
        }
    ]);
    translator()
        .translate_payload(&mut locations, &fx.generated, Direction::GeneratedToSurface)
        .unwrap();

    assert_eq!(locations[0]["uri"], surface_uri.as_str());
    assert_eq!(locations[0]["range"]["start"], json!({"line": 3, "character": 1}));
    assert_eq!(locations[1]["uri"], surface_uri.as_str());
    assert_eq!(locations[1]["range"]["start"], json!({"line": 4, "character": 13}));
}

#[test]
fn test_paths_outside_scheme_pass_through() {
    let out = translator()
        .translate_position(
            Path::new("/etc/hosts"),
            Position {
                line: 2,
                character: 3,
            },
            Direction::SurfaceToGenerated,
        )
        .unwrap();
    assert_eq!(out.path, PathBuf::from("/etc/hosts"));
    assert!(!out.mapped);
}
