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

//! Shared test support: an in-process fake analysis server.
//!
//! Each launch creates a `tokio::io::duplex` pipe served by a task that
//! speaks just enough LSP for the supervisor and bridge:
//!
//! - `initialize` / `shutdown`
//! - `test/slow` `{delayMs, value}`: answers `value` after the delay
//! - `test/hang`: never answers
//! - `test/echo`: answers its params
//! - `textDocument/definition`: a location at the requested position
//! - `textDocument/hover`: a hover whose range is the requested position
//! - `textDocument/didOpen`: publishes the configured diagnostics, if any

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, oneshot};
use veneer_lsp::protocol::{read_message, write_message, JsonRpcRequest, JsonRpcResponse, Message};
use veneer_lsp::{BridgeError, BridgeResult, Launcher, Supervisor, SupervisorState, Transport};

/// A message the fake server received.
#[derive(Debug, Clone)]
pub struct Received {
    pub session: usize,
    pub method: String,
    pub params: Value,
}

/// Observable state shared by every session of a [`FakeLauncher`].
#[derive(Default)]
pub struct FakeState {
    spawns: AtomicUsize,
    fail_spawns: AtomicUsize,
    init_delay_ms: AtomicU64,
    kills: Mutex<Vec<Option<oneshot::Sender<()>>>>,
    received: Mutex<Vec<Received>>,
    responded: Mutex<Vec<Value>>,
    diagnostics: Mutex<Option<Value>>,
}

impl FakeState {
    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Make the next `n` launches fail.
    pub fn fail_next_spawns(&self, n: usize) {
        self.fail_spawns.store(n, Ordering::SeqCst);
    }

    /// Delay every `initialize` answer.
    pub fn set_init_delay(&self, delay: Duration) {
        self.init_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Diagnostics published for every opened document.
    pub fn set_diagnostics(&self, diagnostics: Value) {
        *self.diagnostics.lock().unwrap() = Some(diagnostics);
    }

    /// Terminate the most recent session, as if the process crashed.
    pub fn kill_current(&self) {
        let mut kills = self.kills.lock().unwrap();
        if let Some(kill) = kills.last_mut().and_then(Option::take) {
            let _ = kill.send(());
        }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn methods(&self, session: usize) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|r| r.session == session)
            .map(|r| r.method)
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.received().iter().filter(|r| r.method == method).count()
    }

    /// Results of `test/slow` requests in the order they were answered.
    pub fn responded(&self) -> Vec<Value> {
        self.responded.lock().unwrap().clone()
    }

    fn record(&self, session: usize, method: &str, params: &Value) {
        self.received.lock().unwrap().push(Received {
            session,
            method: method.to_string(),
            params: params.clone(),
        });
    }
}

/// Launches fake analysis servers.
pub struct FakeLauncher {
    state: Arc<FakeState>,
}

impl FakeLauncher {
    pub fn new() -> (Self, Arc<FakeState>) {
        let state = Arc::new(FakeState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> BridgeResult<Transport> {
        let session = self.state.spawns.fetch_add(1, Ordering::SeqCst) + 1;
        let should_fail = self
            .state
            .fail_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BridgeError::Spawn {
                command: "fake".to_string(),
                message: "refused".to_string(),
            });
        }

        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (kill_tx, kill_rx) = oneshot::channel();
        self.state.kills.lock().unwrap().push(Some(kill_tx));
        tokio::spawn(serve(theirs, kill_rx, session, Arc::clone(&self.state)));

        let (reader, writer) = tokio::io::split(ours);
        Ok(Transport {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        })
    }
}

async fn serve(
    stream: tokio::io::DuplexStream,
    mut kill: oneshot::Receiver<()>,
    session: usize,
    state: Arc<FakeState>,
) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if write_message(&mut writer, &message).await.is_err() {
                break;
            }
        }
    });

    loop {
        let message = tokio::select! {
            _ = &mut kill => break,
            message = read_message(&mut reader) => message,
        };
        let request = match message {
            Ok(Some(Message::Request(request))) => request,
            Ok(Some(Message::Response(_))) => continue,
            Ok(None) | Err(_) => break,
        };
        let params = request.params.clone().unwrap_or(Value::Null);
        state.record(session, &request.method, &params);

        if request.is_notification() {
            if request.method == "textDocument/didOpen" {
                let diagnostics = state.diagnostics.lock().unwrap().clone();
                if let Some(diagnostics) = diagnostics {
                    let uri = params["textDocument"]["uri"].clone();
                    let _ = out_tx.send(Message::Request(JsonRpcRequest::notification(
                        "textDocument/publishDiagnostics",
                        json!({"uri": uri, "diagnostics": diagnostics}),
                    )));
                }
            }
            continue;
        }

        let id = request.id.clone();
        let reply = |result: Value| Message::Response(JsonRpcResponse::success(id.clone(), result));
        match request.method.as_str() {
            "initialize" => {
                let delay = state.init_delay_ms.load(Ordering::SeqCst);
                let out = out_tx.clone();
                let message = reply(json!({
                    "capabilities": {
                        "completionProvider": {"triggerCharacters": ["."]},
                        "hoverProvider": true
                    },
                    "serverInfo": {"name": "fake", "version": session.to_string()}
                }));
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = out.send(message);
                });
            }
            "test/slow" => {
                let delay = params["delayMs"].as_u64().unwrap_or(0);
                let value = params["value"].clone();
                let out = out_tx.clone();
                let state = Arc::clone(&state);
                let message = reply(value.clone());
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    state.responded.lock().unwrap().push(value);
                    let _ = out.send(message);
                });
            }
            "test/hang" => {}
            "test/echo" => {
                let _ = out_tx.send(reply(params));
            }
            "textDocument/definition" => {
                let position = params["position"].clone();
                let _ = out_tx.send(reply(json!({
                    "uri": params["textDocument"]["uri"],
                    "range": {"start": position, "end": position}
                })));
            }
            "textDocument/hover" => {
                let position = params["position"].clone();
                let _ = out_tx.send(reply(json!({
                    "contents": "func load() (int, error)",
                    "range": {"start": position, "end": position}
                })));
            }
            _ => {
                let _ = out_tx.send(reply(Value::Null));
            }
        }
    }

    writer_task.abort();
}

/// Wait until the supervisor reports `want`.
pub async fn wait_for_state(supervisor: &Supervisor, want: SupervisorState) {
    let mut states = supervisor.subscribe();
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"))
        .unwrap();
}

/// Wait until at least `n` sessions have been launched.
pub async fn wait_for_spawns(state: &FakeState, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.spawns() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {n} spawns"));
}
