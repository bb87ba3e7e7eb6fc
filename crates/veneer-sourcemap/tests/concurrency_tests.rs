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

//! Concurrency tests for the mapping store.
//!
//! Concurrent misses on the same path must read the sidecar once; readers of
//! distinct paths must not block each other into deadlock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use veneer_sourcemap::*;

/// In-memory sidecar source that counts reads and can be slowed down.
struct CountingSource {
    docs: HashMap<PathBuf, String>,
    reads: Arc<AtomicUsize>,
    delay: Duration,
}

impl TableSource for CountingSource {
    fn read(&self, path: &Path) -> std::io::Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(self.docs.get(path).cloned())
    }
}

fn table_for(i: usize) -> MappingTable {
    MappingTable::new(
        format!("/w/f{}.vnr", i),
        format!("/w/f{}.go", i),
        vec![MappingEntry {
            original_line: 1,
            original_column: 1,
            generated_line: 1 + i as u32,
            generated_column: 1,
            length: 12,
            name: "identity".to_string(),
        }],
    )
}

fn store_with(files: usize, delay: Duration) -> (Arc<MappingStore>, Arc<AtomicUsize>) {
    let scheme = PathScheme::default();
    let docs = (0..files)
        .map(|i| {
            let generated = PathBuf::from(format!("/w/f{}.go", i));
            (scheme.map_path(&generated), table_for(i).to_json().unwrap())
        })
        .collect();
    let reads = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        docs,
        reads: Arc::clone(&reads),
        delay,
    };
    (
        Arc::new(MappingStore::new(source, SystemClock, scheme)),
        reads,
    )
}

#[test]
fn test_concurrent_misses_read_once() {
    let (store, reads) = store_with(1, Duration::from_millis(20));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.get(Path::new("/w/f0.go")).unwrap()
            })
        })
        .collect();

    let tables: Vec<Arc<MappingTable>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(reads.load(Ordering::SeqCst), 1);
    for table in &tables {
        assert!(Arc::ptr_eq(table, &tables[0]));
    }
    let stats = store.statistics();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.hits + stats.misses, 16);
}

#[test]
fn test_many_paths_many_threads() {
    let (store, reads) = store_with(8, Duration::from_millis(1));

    thread::scope(|scope| {
        for t in 0..10 {
            let store = &store;
            scope.spawn(move || {
                for round in 0..50 {
                    let i = (t + round) % 8;
                    let table = store
                        .get(&PathBuf::from(format!("/w/f{}.go", i)))
                        .unwrap();
                    assert_eq!(table.entries()[0].generated_line, 1 + i as u32);
                }
            });
        }
    });

    assert_eq!(reads.load(Ordering::SeqCst), 8);
    assert_eq!(store.statistics().current_size, 8);
}

#[test]
fn test_insert_while_reading() {
    let (store, _) = store_with(1, Duration::ZERO);
    let path = PathBuf::from("/w/f0.go");
    store.get(&path).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..100 {
                store.insert(&path, table_for(i % 3));
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    // Readers always see a whole table, old or new.
                    let table = store.get(&path).unwrap();
                    assert_eq!(table.len(), 1);
                }
            });
        }
    });

    assert_eq!(store.get(&path).unwrap().entries()[0].generated_line, 1 + (99 % 3) as u32);
}
