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

//! Deterministic path derivation between surface, generated and sidecar files.
//!
//! ```text
//! src/main.vnr  <->  src/main.go  ->  src/main.go.map
//!                                 ->  src/main.go.records.json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default surface file extension.
pub const DEFAULT_SURFACE_EXTENSION: &str = "vnr";

/// Default generated file extension.
pub const DEFAULT_GENERATED_EXTENSION: &str = "go";

/// Suffix appended to the generated path for the mapping document.
pub const DEFAULT_MAP_SUFFIX: &str = ".map";

/// Suffix appended to the generated path for the transformation records.
pub const DEFAULT_RECORDS_SUFFIX: &str = ".records.json";

/// Which side of the mapping a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// User-facing source in the extended syntax.
    Surface,
    /// Go code produced by the transform.
    Generated,
    /// Anything else (third-party Go, configs, ...).
    Other,
}

/// Extension rules for companion paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathScheme {
    /// Surface extension without the dot.
    pub surface_extension: String,
    /// Generated extension without the dot.
    pub generated_extension: String,
    /// Mapping document suffix.
    pub map_suffix: String,
    /// Records document suffix.
    pub records_suffix: String,
}

impl Default for PathScheme {
    fn default() -> Self {
        Self {
            surface_extension: DEFAULT_SURFACE_EXTENSION.to_string(),
            generated_extension: DEFAULT_GENERATED_EXTENSION.to_string(),
            map_suffix: DEFAULT_MAP_SUFFIX.to_string(),
            records_suffix: DEFAULT_RECORDS_SUFFIX.to_string(),
        }
    }
}

impl PathScheme {
    /// Classify a path by its extension.
    pub fn role(&self, path: &Path) -> FileRole {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext == self.surface_extension => FileRole::Surface,
            Some(ext) if ext == self.generated_extension => FileRole::Generated,
            _ => FileRole::Other,
        }
    }

    /// Returns `true` if the path is a surface file.
    pub fn is_surface(&self, path: &Path) -> bool {
        self.role(path) == FileRole::Surface
    }

    /// Generated path for a surface path.
    pub fn generated_for(&self, surface: &Path) -> PathBuf {
        surface.with_extension(&self.generated_extension)
    }

    /// Surface path for a generated path.
    pub fn surface_for(&self, generated: &Path) -> PathBuf {
        generated.with_extension(&self.surface_extension)
    }

    /// The opposite representation of `path`, or `None` for unrelated files.
    pub fn companion(&self, path: &Path) -> Option<PathBuf> {
        match self.role(path) {
            FileRole::Surface => Some(self.generated_for(path)),
            FileRole::Generated => Some(self.surface_for(path)),
            FileRole::Other => None,
        }
    }

    /// The generated path used as the mapping key for either side.
    pub fn mapping_key(&self, path: &Path) -> Option<PathBuf> {
        match self.role(path) {
            FileRole::Surface => Some(self.generated_for(path)),
            FileRole::Generated => Some(path.to_path_buf()),
            FileRole::Other => None,
        }
    }

    /// Sidecar mapping document for a generated path.
    pub fn map_path(&self, generated: &Path) -> PathBuf {
        append_suffix(generated, &self.map_suffix)
    }

    /// Records document for a generated path.
    pub fn records_path(&self, generated: &Path) -> PathBuf {
        append_suffix(generated, &self.records_suffix)
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        let scheme = PathScheme::default();
        assert_eq!(scheme.role(Path::new("/w/main.vnr")), FileRole::Surface);
        assert_eq!(scheme.role(Path::new("/w/main.go")), FileRole::Generated);
        assert_eq!(scheme.role(Path::new("/w/go.mod")), FileRole::Other);
        assert_eq!(scheme.role(Path::new("/w/README")), FileRole::Other);
    }

    #[test]
    fn test_companion_swaps_extension() {
        let scheme = PathScheme::default();
        assert_eq!(
            scheme.companion(Path::new("/w/pkg/util.vnr")),
            Some(PathBuf::from("/w/pkg/util.go"))
        );
        assert_eq!(
            scheme.companion(Path::new("/w/pkg/util.go")),
            Some(PathBuf::from("/w/pkg/util.vnr"))
        );
        assert_eq!(scheme.companion(Path::new("/w/notes.txt")), None);
    }

    #[test]
    fn test_sidecar_paths() {
        let scheme = PathScheme::default();
        let generated = Path::new("/w/main.go");
        assert_eq!(scheme.map_path(generated), PathBuf::from("/w/main.go.map"));
        assert_eq!(
            scheme.records_path(generated),
            PathBuf::from("/w/main.go.records.json")
        );
    }

    #[test]
    fn test_mapping_key_is_generated_path() {
        let scheme = PathScheme::default();
        assert_eq!(
            scheme.mapping_key(Path::new("/w/a.vnr")),
            Some(PathBuf::from("/w/a.go"))
        );
        assert_eq!(
            scheme.mapping_key(Path::new("/w/a.go")),
            Some(PathBuf::from("/w/a.go"))
        );
    }

    #[test]
    fn test_custom_scheme_deserializes_with_defaults() {
        let scheme: PathScheme =
            serde_json::from_str(r#"{"surfaceExtension": "dg"}"#).unwrap();
        assert_eq!(scheme.surface_extension, "dg");
        assert_eq!(scheme.generated_extension, "go");
        assert!(scheme.is_surface(Path::new("x.dg")));
    }
}
