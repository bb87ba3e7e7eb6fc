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

//! Regeneration debounce tests on a paused clock.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use veneer_lsp::debounce::Debouncer;

const WINDOW: Duration = Duration::from_millis(500);

#[tokio::test(start_paused = true)]
async fn test_five_saves_fifty_ms_apart_regenerate_once() {
    let (debouncer, mut settled) = Debouncer::new(WINDOW);
    let path = Path::new("/w/main.vnr");

    for _ in 0..5 {
        debouncer.trigger(path);
        sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(settled.recv().await, Some(PathBuf::from("/w/main.vnr")));
    assert!(
        timeout(Duration::from_secs(2), settled.recv()).await.is_err(),
        "burst must collapse into a single regeneration"
    );
}

#[tokio::test(start_paused = true)]
async fn test_saves_further_apart_than_window_regenerate_each_time() {
    let (debouncer, mut settled) = Debouncer::new(WINDOW);
    let path = Path::new("/w/main.vnr");

    debouncer.trigger(path);
    sleep(Duration::from_millis(700)).await;
    debouncer.trigger(path);

    let mut count = 0;
    while timeout(Duration::from_secs(2), settled.recv()).await.is_ok() {
        count += 1;
    }
    assert_eq!(count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_emission_waits_for_the_window() {
    let (debouncer, mut settled) = Debouncer::new(WINDOW);
    debouncer.trigger(Path::new("/w/main.vnr"));

    sleep(Duration::from_millis(400)).await;
    assert!(settled.try_recv().is_err());

    sleep(Duration::from_millis(200)).await;
    assert!(settled.try_recv().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_forgets_path() {
    let (debouncer, _settled) = Debouncer::new(WINDOW);
    debouncer.trigger(Path::new("/w/a.vnr"));
    debouncer.trigger(Path::new("/w/b.vnr"));
    assert_eq!(debouncer.tracked(), 2);

    debouncer.cancel(Path::new("/w/a.vnr"));
    assert_eq!(debouncer.tracked(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_settled_paths_release_their_slot() {
    let (debouncer, mut settled) = Debouncer::new(WINDOW);
    for i in 0..50 {
        debouncer.trigger(&PathBuf::from(format!("/w/pkg{}/main.vnr", i)));
    }
    assert_eq!(debouncer.tracked(), 50);

    for _ in 0..50 {
        assert!(settled.recv().await.is_some());
    }
    sleep(Duration::from_millis(10)).await;
    assert_eq!(debouncer.tracked(), 0);

    // A released path debounces again from scratch.
    debouncer.trigger(Path::new("/w/pkg0/main.vnr"));
    assert_eq!(debouncer.tracked(), 1);
    assert_eq!(settled.recv().await, Some(PathBuf::from("/w/pkg0/main.vnr")));
}
