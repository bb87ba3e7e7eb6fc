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

//! Position translation between surface and generated coordinates.
//!
//! Protocol positions are 0-based; mapping tables are 1-based. Every public
//! entry point here takes and returns protocol coordinates.
//!
//! # Fallbacks
//!
//! | Situation | Surface → Generated | Generated → Surface |
//! |---|---|---|
//! | no table | `NotGenerated` error | position unchanged |
//! | no covering entry | position unchanged | position unchanged |
//! | not a surface/generated file | unchanged | unchanged |
//!
//! Translated columns are clamped to the length of the target line so residual
//! drift never yields a column the analysis tool would reject.

use crate::error::{SourceMapError, SourceMapResult};
use crate::paths::FileRole;
use crate::store::MappingStore;
use crate::table::MappingTable;
use crate::text::line_char_len;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_lsp::lsp_types::{Position, Range, Url};
use tracing::trace;

/// Translation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Editor request to analysis tool.
    SurfaceToGenerated,
    /// Analysis tool response to editor.
    GeneratedToSurface,
}

/// Provides line lengths of target files for column clamping.
pub trait LineSource: Send + Sync {
    /// Character length of every line of `path`, or `None` if unreadable.
    fn line_lengths(&self, path: &Path) -> Option<Vec<u32>>;
}

/// Reads line lengths from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLineSource;

impl LineSource for FsLineSource {
    fn line_lengths(&self, path: &Path) -> Option<Vec<u32>> {
        let content = std::fs::read_to_string(path).ok()?;
        Some(content.lines().map(|l| line_char_len(l) as u32).collect())
    }
}

/// A translated position and the file it now refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub path: PathBuf,
    pub position: Position,
    /// `false` when a fallback passed the position through unchanged.
    pub mapped: bool,
}

/// Line lengths memoized for the duration of one translation call.
type LineCache = HashMap<PathBuf, Option<Vec<u32>>>;

/// Translates positions, ranges and protocol payloads using a [`MappingStore`].
pub struct PositionTranslator {
    store: Arc<MappingStore>,
    lines: Box<dyn LineSource>,
}

impl PositionTranslator {
    /// Translator reading target lines from disk.
    pub fn new(store: Arc<MappingStore>) -> Self {
        Self::with_line_source(store, FsLineSource)
    }

    pub fn with_line_source(store: Arc<MappingStore>, lines: impl LineSource + 'static) -> Self {
        Self {
            store,
            lines: Box::new(lines),
        }
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    /// Translate a single position.
    pub fn translate_position(
        &self,
        path: &Path,
        position: Position,
        direction: Direction,
    ) -> SourceMapResult<Translated> {
        let mut cache = LineCache::new();
        self.translate_cached(path, position, direction, &mut cache)
    }

    /// Translate a range; start and end are translated independently.
    pub fn translate_range(
        &self,
        path: &Path,
        range: Range,
        direction: Direction,
    ) -> SourceMapResult<(PathBuf, Range)> {
        let mut cache = LineCache::new();
        self.translate_range_cached(path, range, direction, &mut cache)
    }

    /// Rewrite every position embedded in a protocol payload.
    ///
    /// `path` is the document the payload is about; objects carrying their own
    /// `uri` or `targetUri` switch to that document, and their URI is rewritten
    /// to the companion file when a mapping exists. Non-positional content is
    /// left untouched.
    pub fn translate_payload(
        &self,
        value: &mut Value,
        path: &Path,
        direction: Direction,
    ) -> SourceMapResult<()> {
        let mut cache = LineCache::new();
        self.walk(value, path, direction, &mut cache)
    }

    /// URI of the companion document, if `uri` should be rewritten.
    pub fn translate_uri(&self, uri: &Url, direction: Direction) -> SourceMapResult<Option<Url>> {
        let Ok(path) = uri.to_file_path() else {
            return Ok(None);
        };
        Ok(self
            .companion_path(&path, direction)?
            .and_then(|p| Url::from_file_path(p).ok()))
    }

    fn companion_path(&self, path: &Path, direction: Direction) -> SourceMapResult<Option<PathBuf>> {
        let scheme = self.store.scheme();
        match (direction, scheme.role(path)) {
            (Direction::SurfaceToGenerated, FileRole::Surface) => {
                Ok(Some(scheme.generated_for(path)))
            }
            (Direction::GeneratedToSurface, FileRole::Generated) => match self.store.get(path) {
                Ok(_) => Ok(Some(scheme.surface_for(path))),
                Err(e) if e.is_not_generated() => Ok(None),
                Err(e) => Err(e),
            },
            _ => Ok(None),
        }
    }

    /// Resolve the table for a translation, applying the direction's fallback.
    ///
    /// `Ok(None)` means "pass through unchanged".
    fn resolve(
        &self,
        path: &Path,
        direction: Direction,
    ) -> SourceMapResult<Option<(Arc<MappingTable>, PathBuf)>> {
        let scheme = self.store.scheme();
        match (direction, scheme.role(path)) {
            (Direction::SurfaceToGenerated, FileRole::Surface) => {
                let generated = scheme.generated_for(path);
                match self.store.get(&generated) {
                    Ok(table) => Ok(Some((table, generated))),
                    Err(e) if e.is_not_generated() => Err(SourceMapError::NotGenerated {
                        path: generated,
                    }),
                    Err(e) => Err(e),
                }
            }
            (Direction::GeneratedToSurface, FileRole::Generated) => match self.store.get(path) {
                Ok(table) => Ok(Some((table, scheme.surface_for(path)))),
                Err(e) if e.is_not_generated() => Ok(None),
                Err(e) => Err(e),
            },
            _ => Ok(None),
        }
    }

    fn translate_cached(
        &self,
        path: &Path,
        position: Position,
        direction: Direction,
        cache: &mut LineCache,
    ) -> SourceMapResult<Translated> {
        let Some((table, target)) = self.resolve(path, direction)? else {
            return Ok(Translated {
                path: path.to_path_buf(),
                position,
                mapped: false,
            });
        };

        let line = position.line.saturating_add(1);
        let column = position.character.saturating_add(1);

        let found = match direction {
            Direction::SurfaceToGenerated => table.find_by_original(line, column).map(|e| {
                (
                    e.generated_line,
                    e.generated_column
                        .saturating_add(column.saturating_sub(e.original_column)),
                )
            }),
            Direction::GeneratedToSurface => table.find_by_generated(line, column).map(|e| {
                (
                    e.original_line,
                    e.original_column
                        .saturating_add(column.saturating_sub(e.generated_column)),
                )
            }),
        };

        let mapped = found.is_some();
        let (target_line, target_column) = found.unwrap_or((line, column));
        let target_column = self.clamp_column(&target, target_line, target_column, cache);

        let translated = Position {
            line: target_line.saturating_sub(1),
            character: target_column.saturating_sub(1),
        };
        trace!(
            "{:?}: {}:{}:{} -> {}:{}:{} (mapped: {})",
            direction,
            path.display(),
            position.line,
            position.character,
            target.display(),
            translated.line,
            translated.character,
            mapped
        );
        Ok(Translated {
            path: target,
            position: translated,
            mapped,
        })
    }

    fn translate_range_cached(
        &self,
        path: &Path,
        range: Range,
        direction: Direction,
        cache: &mut LineCache,
    ) -> SourceMapResult<(PathBuf, Range)> {
        let start = self.translate_cached(path, range.start, direction, cache)?;
        let end = self.translate_cached(path, range.end, direction, cache)?;
        // Independent translation can invert a range that spans two entries.
        let end_position = if (end.position.line, end.position.character)
            < (start.position.line, start.position.character)
        {
            start.position
        } else {
            end.position
        };
        Ok((
            start.path,
            Range {
                start: start.position,
                end: end_position,
            },
        ))
    }

    /// Clamp a 1-based column to one past the end of the target line.
    fn clamp_column(&self, target: &Path, line: u32, column: u32, cache: &mut LineCache) -> u32 {
        let lengths = cache
            .entry(target.to_path_buf())
            .or_insert_with(|| self.lines.line_lengths(target));
        match lengths.as_ref().and_then(|l| l.get(line.saturating_sub(1) as usize)) {
            Some(&len) => column.min(len.saturating_add(1)).max(1),
            None => column.max(1),
        }
    }

    fn walk(
        &self,
        value: &mut Value,
        context: &Path,
        direction: Direction,
        cache: &mut LineCache,
    ) -> SourceMapResult<()> {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.walk(item, context, direction, cache)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                if let Some(position) = as_position(map) {
                    let translated = self.translate_cached(context, position, direction, cache)?;
                    write_position(map, translated.position);
                    return Ok(());
                }
                if let Some(range) = as_range(map) {
                    let (_, translated) =
                        self.translate_range_cached(context, range, direction, cache)?;
                    write_range(map, translated);
                    return Ok(());
                }

                let mut local = context.to_path_buf();
                for key in ["uri", "targetUri"] {
                    if let Some(Value::String(uri)) = map.get_mut(key) {
                        let Some(path) = Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
                        else {
                            continue;
                        };
                        if let Some(companion) = self.companion_path(&path, direction)? {
                            if let Ok(new_uri) = Url::from_file_path(&companion) {
                                *uri = new_uri.to_string();
                            }
                        }
                        local = path;
                    }
                }

                for (key, child) in map.iter_mut() {
                    // A link's origin lies in the requesting document, not the target.
                    let scope = if key == "originSelectionRange" {
                        context
                    } else {
                        local.as_path()
                    };
                    self.walk(child, scope, direction, cache)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn as_position(map: &Map<String, Value>) -> Option<Position> {
    if map.len() != 2 {
        return None;
    }
    let line = map.get("line")?.as_u64()?;
    let character = map.get("character")?.as_u64()?;
    Some(Position {
        line: u32::try_from(line).ok()?,
        character: u32::try_from(character).ok()?,
    })
}

fn as_range(map: &Map<String, Value>) -> Option<Range> {
    if map.len() != 2 {
        return None;
    }
    let start = as_position(map.get("start")?.as_object()?)?;
    let end = as_position(map.get("end")?.as_object()?)?;
    Some(Range { start, end })
}

fn write_position(map: &mut Map<String, Value>, position: Position) {
    map.insert("line".to_string(), Value::from(position.line));
    map.insert("character".to_string(), Value::from(position.character));
}

fn write_range(map: &mut Map<String, Value>, range: Range) {
    if let Some(Value::Object(start)) = map.get_mut("start") {
        write_position(start, range.start);
    }
    if let Some(Value::Object(end)) = map.get_mut("end") {
        write_position(end, range.end);
    }
}
