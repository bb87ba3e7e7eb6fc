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

//! Analysis tool subprocess supervision.
//!
//! # State machine
//!
//! ```text
//! NotStarted -> Starting -> Ready <-> Restarting
//!                              \          |
//!                               +-> Failed <+
//! ```
//!
//! A crash moves `Ready` to `Restarting` while restart budget remains, and to
//! `Failed` once it is spent. `Failed` is terminal until [`Supervisor::restart`]
//! resets the budget. Restarts are serialized by an async mutex; requests that
//! arrive meanwhile wait on the state channel and then run on the new process
//! or fail with [`BridgeError::Degraded`].
//!
//! After every (re)start the `initialize`/`initialized` handshake is replayed
//! with the editor's original parameters, followed by `didOpen` for every
//! generated document the bridge has open.

use crate::constants::GENERATED_LANGUAGE_ID;
use crate::error::{BridgeError, BridgeResult};
use crate::upstream::{Notification, UpstreamClient};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tower_lsp::lsp_types::Url;
use tracing::{debug, error, info, warn};

/// How long a shut-down analysis tool may take to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of the analysis tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Starting,
    Ready,
    Restarting,
    /// Restart budget exhausted.
    Failed,
}

/// Byte streams to a freshly started analysis tool.
pub struct Transport {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Process handle, if the tool runs as a child process.
    pub child: Option<Child>,
}

/// Starts analysis tool instances.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> BridgeResult<Transport>;
}

/// Launches the analysis tool as a child process speaking LSP on stdio.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    /// Run the tool in the given directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self) -> BridgeResult<Transport> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| BridgeError::Spawn {
            command: self.program.clone(),
            message: e.to_string(),
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Protocol("analysis tool stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Protocol("analysis tool stdout unavailable".to_string()))?;

        info!("Started {} (pid {:?})", self.program, child.id());
        Ok(Transport {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

/// A generated document opened in the analysis tool.
#[derive(Debug, Clone)]
struct OpenDocument {
    version: i32,
    text: String,
}

impl OpenDocument {
    fn did_open(&self, uri: &Url) -> Value {
        json!({
            "textDocument": {
                "uri": uri,
                "languageId": GENERATED_LANGUAGE_ID,
                "version": self.version,
                "text": self.text,
            }
        })
    }
}

struct Session {
    client: UpstreamClient,
    child: Mutex<Option<Child>>,
    generation: u64,
}

impl Session {
    fn kill(&self) {
        if let Some(child) = self.child.lock().as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("Kill of session {} failed: {}", self.generation, e);
            }
        }
    }
}

/// Owns the analysis tool process and the connection to it.
pub struct Supervisor {
    launcher: Box<dyn Launcher>,
    max_restarts: u32,
    request_timeout: Duration,
    state: watch::Sender<SupervisorState>,
    session: RwLock<Option<Arc<Session>>>,
    restart_lock: tokio::sync::Mutex<()>,
    restarts: AtomicU32,
    generation: AtomicU64,
    shutting_down: AtomicBool,
    initialize_params: Mutex<Option<Value>>,
    initialize_result: Mutex<Option<Value>>,
    documents: DashMap<Url, OpenDocument>,
    notifications: mpsc::UnboundedSender<Notification>,
    crashes: mpsc::UnboundedSender<u64>,
}

impl Supervisor {
    /// Create a supervisor. Must be called inside a tokio runtime.
    ///
    /// Notifications from every session are merged into the returned receiver.
    pub fn new(
        launcher: impl Launcher + 'static,
        max_restarts: u32,
        request_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (crash_tx, mut crash_rx) = mpsc::unbounded_channel::<u64>();
        let (state, _) = watch::channel(SupervisorState::NotStarted);

        let supervisor = Arc::new(Self {
            launcher: Box::new(launcher),
            max_restarts,
            request_timeout,
            state,
            session: RwLock::new(None),
            restart_lock: tokio::sync::Mutex::new(()),
            restarts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            initialize_params: Mutex::new(None),
            initialize_result: Mutex::new(None),
            documents: DashMap::new(),
            notifications: notify_tx,
            crashes: crash_tx,
        });

        let weak: Weak<Self> = Arc::downgrade(&supervisor);
        tokio::spawn(async move {
            while let Some(generation) = crash_rx.recv().await {
                let Some(supervisor) = weak.upgrade() else {
                    break;
                };
                supervisor.on_session_closed(generation).await;
            }
        });

        (supervisor, notify_rx)
    }

    /// Start the tool and perform the handshake.
    ///
    /// Returns the tool's `initialize` result.
    pub async fn start(&self, initialize_params: Value) -> BridgeResult<Value> {
        let _guard = self.restart_lock.lock().await;
        *self.initialize_params.lock() = Some(initialize_params);
        self.set_state(SupervisorState::Starting);
        self.bring_up().await
    }

    /// Reset the restart budget and start a fresh process.
    pub async fn restart(&self) -> BridgeResult<Value> {
        let _guard = self.restart_lock.lock().await;
        if self.initialize_params.lock().is_none() {
            return Err(BridgeError::Protocol(
                "analysis tool was never started".to_string(),
            ));
        }
        info!("Manual restart of the analysis tool requested");
        self.restarts.store(0, Ordering::SeqCst);
        let old = self.session.write().take();
        if let Some(old) = old {
            old.kill();
        }
        self.set_state(SupervisorState::Restarting);
        self.bring_up().await
    }

    /// Send `shutdown` and `exit`, then stop the process.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _guard = self.restart_lock.lock().await;
        let session = self.session.write().take();
        self.set_state(SupervisorState::NotStarted);
        let Some(session) = session else {
            return;
        };

        if let Err(e) = session.client.request("shutdown", Value::Null).await {
            debug!("Analysis tool shutdown request failed: {}", e);
        }
        let _ = session.client.notify("exit", Value::Null);

        let child = session.child.lock().take();
        if let Some(mut child) = child {
            if tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_err() {
                warn!("Analysis tool did not exit in time, killing it");
                let _ = child.start_kill();
            }
        }
    }

    /// Send a request to the ready tool.
    pub async fn request(&self, method: &str, params: Value) -> BridgeResult<Value> {
        let session = self.ready_session().await?;
        session.client.request(method, params).await
    }

    /// Send a notification if a session is up; otherwise it is dropped.
    pub fn notify(&self, method: &str, params: Value) {
        let session = self.session.read().clone();
        match session {
            Some(session) => {
                if let Err(e) = session.client.notify(method, params) {
                    debug!("Dropped '{}': {}", method, e);
                }
            }
            None => debug!("No analysis tool session, dropped '{}'", method),
        }
    }

    /// Open a generated document in the tool; replayed after every restart.
    pub fn open_document(&self, uri: Url, text: String) {
        if self.documents.contains_key(&uri) {
            self.change_document(&uri, text);
            return;
        }
        let doc = OpenDocument { version: 1, text };
        // Holding the slot orders this against session replay.
        let slot = self.session.read();
        if let Some(session) = slot.as_ref() {
            if let Err(e) = session.client.notify("textDocument/didOpen", doc.did_open(&uri)) {
                debug!("didOpen for {} not delivered: {}", uri, e);
            }
        }
        self.documents.insert(uri, doc);
    }

    /// Replace the full text of an open generated document.
    ///
    /// Returns `false` if the document is not open.
    pub fn change_document(&self, uri: &Url, text: String) -> bool {
        let Some(mut doc) = self.documents.get_mut(uri) else {
            return false;
        };
        doc.version += 1;
        doc.text = text;
        let params = json!({
            "textDocument": {"uri": uri, "version": doc.version},
            "contentChanges": [{"text": doc.text}],
        });
        drop(doc);
        self.notify("textDocument/didChange", params);
        true
    }

    /// Close a generated document.
    pub fn close_document(&self, uri: &Url) -> bool {
        if self.documents.remove(uri).is_none() {
            return false;
        }
        self.notify(
            "textDocument/didClose",
            json!({"textDocument": {"uri": uri}}),
        );
        true
    }

    pub fn is_document_open(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Restarts used from the current budget.
    pub fn restarts_used(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// The tool's last `initialize` result.
    pub fn initialize_result(&self) -> Option<Value> {
        self.initialize_result.lock().clone()
    }

    fn set_state(&self, state: SupervisorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Analysis tool state: {:?} -> {:?}", previous, state);
        }
    }

    async fn ready_session(&self) -> BridgeResult<Arc<Session>> {
        let mut state = self.state.subscribe();
        loop {
            let current = *state.borrow_and_update();
            match current {
                SupervisorState::Ready => {
                    if let Some(session) = self.session.read().clone() {
                        return Ok(session);
                    }
                }
                SupervisorState::Failed => {
                    return Err(BridgeError::Degraded {
                        restarts: self.restarts_used(),
                    })
                }
                SupervisorState::NotStarted => {
                    return Err(BridgeError::Protocol(
                        "analysis tool not started".to_string(),
                    ))
                }
                SupervisorState::Starting | SupervisorState::Restarting => {}
            }
            if state.changed().await.is_err() {
                return Err(BridgeError::SubprocessCrashed(
                    "supervisor stopped".to_string(),
                ));
            }
        }
    }

    /// Spawn sessions until one comes up or the budget runs out.
    ///
    /// Caller holds `restart_lock`.
    async fn bring_up(&self) -> BridgeResult<Value> {
        loop {
            match self.spawn_session().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let used = self.restarts.load(Ordering::SeqCst);
                    if used >= self.max_restarts {
                        error!("Analysis tool failed to start: {}", e);
                        self.set_state(SupervisorState::Failed);
                        return Err(e);
                    }
                    self.restarts.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        "Analysis tool failed to start ({}), retrying ({}/{})",
                        e,
                        used + 1,
                        self.max_restarts
                    );
                    self.set_state(SupervisorState::Restarting);
                }
            }
        }
    }

    async fn spawn_session(&self) -> BridgeResult<Value> {
        let transport = self.launcher.launch().await?;
        let (client, mut notifications) =
            UpstreamClient::connect(transport.reader, transport.writer, self.request_timeout);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let params = self.initialize_params.lock().clone().unwrap_or(Value::Null);
        let result = client.request("initialize", params).await?;
        client.notify("initialized", json!({}))?;

        let session = Arc::new(Session {
            client,
            child: Mutex::new(transport.child),
            generation,
        });

        {
            let mut slot = self.session.write();
            for doc in self.documents.iter() {
                session
                    .client
                    .notify("textDocument/didOpen", doc.value().did_open(doc.key()))?;
            }
            *slot = Some(Arc::clone(&session));
        }
        *self.initialize_result.lock() = Some(result.clone());

        let forward = self.notifications.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                if forward.send(notification).is_err() {
                    break;
                }
            }
        });

        let crashes = self.crashes.clone();
        let monitored = Arc::clone(&session);
        tokio::spawn(async move {
            monitored.client.closed().await;
            let _ = crashes.send(monitored.generation);
        });

        info!(
            "Analysis tool session {} ready ({} documents replayed)",
            generation,
            self.documents.len()
        );
        self.set_state(SupervisorState::Ready);
        Ok(result)
    }

    async fn on_session_closed(&self, generation: u64) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.restart_lock.lock().await;
        let current = self.session.read().as_ref().map(|s| s.generation);
        if current != Some(generation) {
            debug!("Ignoring exit of superseded session {}", generation);
            return;
        }
        let old = self.session.write().take();
        if let Some(old) = old {
            old.kill();
        }

        let used = self.restarts.load(Ordering::SeqCst);
        if used >= self.max_restarts {
            error!(
                "Analysis tool exited and the restart budget ({}) is spent; giving up",
                self.max_restarts
            );
            self.set_state(SupervisorState::Failed);
            return;
        }
        self.restarts.fetch_add(1, Ordering::SeqCst);
        warn!(
            "Analysis tool exited unexpectedly, restarting ({}/{})",
            used + 1,
            self.max_restarts
        );
        self.set_state(SupervisorState::Restarting);
        if let Err(e) = self.bring_up().await {
            error!("Analysis tool restart failed: {}", e);
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.kill();
        }
    }
}
