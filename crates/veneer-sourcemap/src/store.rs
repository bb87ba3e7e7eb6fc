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

//! Mapping table cache with lazy loading and explicit invalidation.
//!
//! # Responsibilities
//!
//! - Loading sidecar documents on first lookup
//! - Schema version validation
//! - Caching immutable tables behind `Arc`
//! - Invalidation on file-change and workspace events
//! - Cache statistics tracking
//!
//! # Design
//!
//! The store is keyed by generated-file path. Hits take only a shared read
//! lock. A miss takes the write lock, re-checks the slot (another thread may
//! have loaded it while this one waited), then reads and parses the sidecar.
//! Two threads missing on the same key therefore cause exactly one disk read.
//!
//! Errors are never cached: a missing, malformed or too-new document is
//! re-read on the next lookup.

use crate::error::{SourceMapError, SourceMapResult};
use crate::paths::PathScheme;
use crate::table::MappingTable;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Where sidecar documents come from.
///
/// The production implementation reads the filesystem; tests substitute
/// in-memory or counting sources.
pub trait TableSource: Send + Sync {
    /// Read the document at `path`. `Ok(None)` means it does not exist.
    fn read(&self, path: &Path) -> std::io::Result<Option<String>>;
}

/// Reads sidecar documents from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTableSource;

impl TableSource for FsTableSource {
    fn read(&self, path: &Path) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Time source for load timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found no cached table.
    pub misses: u64,
    /// Sidecar documents read and parsed successfully.
    pub loads: u64,
    /// Explicit removals.
    pub invalidations: u64,
    /// Tables currently cached.
    pub current_size: usize,
}

struct CachedTable {
    table: Arc<MappingTable>,
    loaded_at: Instant,
}

/// Thread-safe cache of mapping tables keyed by generated-file path.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use veneer_sourcemap::MappingStore;
///
/// let store = MappingStore::with_defaults();
/// match store.get(Path::new("/work/main.go")) {
///     Ok(table) => println!("{} entries", table.len()),
///     Err(e) if e.is_not_generated() => println!("regenerate first"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
pub struct MappingStore {
    tables: RwLock<HashMap<PathBuf, CachedTable>>,
    source: Box<dyn TableSource>,
    clock: Box<dyn Clock>,
    scheme: PathScheme,
    stats: Mutex<StoreStatistics>,
}

impl MappingStore {
    /// Create a store with injected dependencies.
    pub fn new(
        source: impl TableSource + 'static,
        clock: impl Clock + 'static,
        scheme: PathScheme,
    ) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            source: Box::new(source),
            clock: Box::new(clock),
            scheme,
            stats: Mutex::new(StoreStatistics::default()),
        }
    }

    /// Filesystem-backed store with the default path scheme.
    pub fn with_defaults() -> Self {
        Self::new(FsTableSource, SystemClock, PathScheme::default())
    }

    /// The path scheme used to locate sidecar documents.
    pub fn scheme(&self) -> &PathScheme {
        &self.scheme
    }

    /// Get the mapping table for a generated file, loading it on first use.
    pub fn get(&self, generated: &Path) -> SourceMapResult<Arc<MappingTable>> {
        if let Some(cached) = self.tables.read().get(generated) {
            self.stats.lock().hits += 1;
            return Ok(Arc::clone(&cached.table));
        }

        let mut tables = self.tables.write();
        // Another thread may have finished loading while this one waited.
        if let Some(cached) = tables.get(generated) {
            self.stats.lock().hits += 1;
            return Ok(Arc::clone(&cached.table));
        }
        self.stats.lock().misses += 1;

        let table = Arc::new(self.load(generated)?);
        tables.insert(
            generated.to_path_buf(),
            CachedTable {
                table: Arc::clone(&table),
                loaded_at: self.clock.now(),
            },
        );
        self.stats.lock().loads += 1;
        debug!(
            "Cached mapping table for {} ({} entries, {} tables cached)",
            generated.display(),
            table.len(),
            tables.len()
        );
        Ok(table)
    }

    fn load(&self, generated: &Path) -> SourceMapResult<MappingTable> {
        let map_path = self.scheme.map_path(generated);
        let content = self
            .source
            .read(&map_path)
            .map_err(|e| SourceMapError::io(&map_path, e))?
            .ok_or_else(|| SourceMapError::NotGenerated {
                path: generated.to_path_buf(),
            })?;

        MappingTable::from_json(&map_path, &content).map_err(|e| {
            warn!("Rejected mapping document {}: {}", map_path.display(), e);
            e
        })
    }

    /// Replace the cached table for a generated file with a freshly built one.
    pub fn insert(&self, generated: &Path, table: MappingTable) -> Arc<MappingTable> {
        let table = Arc::new(table);
        self.tables.write().insert(
            generated.to_path_buf(),
            CachedTable {
                table: Arc::clone(&table),
                loaded_at: self.clock.now(),
            },
        );
        table
    }

    /// Remove one cached table.
    ///
    /// Returns `true` if a table was cached for the path.
    pub fn invalidate(&self, generated: &Path) -> bool {
        let removed = self.tables.write().remove(generated).is_some();
        if removed {
            self.stats.lock().invalidations += 1;
            debug!("Invalidated mapping table for {}", generated.display());
        }
        removed
    }

    /// Remove every cached table.
    pub fn invalidate_all(&self) {
        let mut tables = self.tables.write();
        let count = tables.len();
        tables.clear();
        self.stats.lock().invalidations += count as u64;
        debug!("Invalidated all {} cached mapping tables", count);
    }

    /// Returns `true` if a table is cached for the path (no loading).
    pub fn contains(&self, generated: &Path) -> bool {
        self.tables.read().contains_key(generated)
    }

    /// When the cached table for a path was loaded or inserted.
    pub fn loaded_at(&self, generated: &Path) -> Option<Instant> {
        self.tables.read().get(generated).map(|c| c.loaded_at)
    }

    /// Snapshot of cache statistics.
    pub fn statistics(&self) -> StoreStatistics {
        let mut stats = self.stats.lock().clone();
        stats.current_size = self.tables.read().len();
        stats
    }
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}
