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

//! Per-path event batching.
//!
//! The first trigger for a path opens a fixed window; triggers arriving
//! inside it are absorbed, and the path is emitted once when it closes.
//! A path that goes quiet after its emission releases its batching task.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::trace;

type Channels = Arc<DashMap<PathBuf, mpsc::UnboundedSender<()>>>;

/// Collapses bursts of triggers per path into single emissions.
pub struct Debouncer {
    window: Duration,
    channels: Channels,
    output: mpsc::UnboundedSender<PathBuf>,
}

impl Debouncer {
    /// Create a debouncer and the receiver of settled paths.
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (output, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            window,
            channels: Arc::new(DashMap::new()),
            output,
        };
        (debouncer, rx)
    }

    /// Record an event for `path`. Must be called inside a tokio runtime.
    pub fn trigger(&self, path: &Path) {
        loop {
            let tx = match self.channels.get(path) {
                Some(entry) => entry.clone(),
                None => self
                    .channels
                    .entry(path.to_path_buf())
                    .or_insert_with(|| self.spawn_window(path))
                    .clone(),
            };
            if tx.send(()).is_ok() {
                return;
            }
            // That window just retired; open a new one.
            self.channels
                .remove_if(path, |_, current| current.same_channel(&tx));
        }
    }

    fn spawn_window(&self, path: &Path) -> mpsc::UnboundedSender<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let own = tx.clone();
        let window = self.window;
        let output = self.output.clone();
        let channels = Arc::clone(&self.channels);
        let key = path.to_path_buf();

        tokio::spawn(async move {
            if rx.recv().await.is_none() {
                return;
            }
            loop {
                sleep(window).await;
                // Drain signals that arrived during the window
                while rx.try_recv().is_ok() {}

                trace!("Debounce window closed for {}", key.display());
                if output.send(key.clone()).is_err() {
                    break;
                }

                channels.remove_if(&key, |_, current| current.same_channel(&own));
                rx.close();
                // A trigger that got in before the close gets one more window.
                if rx.try_recv().is_err() {
                    break;
                }
            }
            trace!("Debounce task for {} retired", key.display());
        });

        tx
    }

    /// Stop tracking `path`. A window already open still emits.
    pub fn cancel(&self, path: &Path) {
        self.channels.remove(path);
    }

    /// Number of paths with an open or pending window.
    pub fn tracked(&self) -> usize {
        self.channels.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
