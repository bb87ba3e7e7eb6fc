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

//! Workspace file watching.
//!
//! Surface edits made outside the editor (branch switches, formatters) go
//! through the same regeneration path as saves, and sidecar mapping files
//! rewritten by an external build invalidate the cached table.

use crate::error::{BridgeError, BridgeResult};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use veneer_sourcemap::{FileRole, PathScheme};

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A surface file was created or modified.
    SurfaceChanged(PathBuf),
    /// The mapping sidecar of this generated file was rewritten.
    MappingChanged(PathBuf),
}

/// Classify a changed path.
pub fn classify(scheme: &PathScheme, path: &Path) -> Option<WatchEvent> {
    if scheme.role(path) == FileRole::Surface {
        return Some(WatchEvent::SurfaceChanged(path.to_path_buf()));
    }
    let text = path.to_str()?;
    let generated = Path::new(text.strip_suffix(scheme.map_suffix.as_str())?);
    (scheme.role(generated) == FileRole::Generated)
        .then(|| WatchEvent::MappingChanged(generated.to_path_buf()))
}

/// Recursive watcher over a workspace root.
pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl FileWatcher {
    pub fn new(root: &Path, scheme: PathScheme, debounce_ms: u64) -> BridgeResult<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |res: Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    for event in events {
                        let Some(classified) = classify(&scheme, &event.path) else {
                            continue;
                        };
                        debug!(path = %event.path.display(), "File change detected");
                        if event_tx.send(classified).is_err() {
                            debug!("Event receiver dropped, stopping watcher");
                            break;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            },
        )
        .map_err(|e| watch_error("failed to create file watcher", e))?;

        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| watch_error("failed to watch workspace root", e))?;

        info!(
            path = %root.display(),
            debounce_ms,
            "Started workspace watcher"
        );

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Receive the next event; `None` once the watcher stopped.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }
}

fn watch_error(context: &str, e: notify::Error) -> BridgeError {
    BridgeError::Io(std::io::Error::other(format!("{}: {}", context, e)))
}
