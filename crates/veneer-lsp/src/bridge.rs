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

//! Editor-independent core of the protocol bridge.
//!
//! [`Bridge`] owns every moving part: the supervised analysis tool, the
//! mapping store and translator, the regeneration pipeline and its debouncer,
//! and the workspace watcher. Everything the editor must see is emitted as a
//! [`BridgeEvent`], so the core can be driven without an LSP client.

use crate::config::{strip_bridge_options, BridgeConfig};
use crate::constants::{
    FILE_CHANGE_TYPE_CHANGED, REGENERATE_COMMAND, RESTART_COMMAND, WATCHER_COALESCE_MS,
};
use crate::debounce::Debouncer;
use crate::error::{BridgeError, BridgeResult};
use crate::regenerate::{diagnostics_for_error, RegenerationOutcome, Regenerator};
use crate::supervisor::{Launcher, ProcessLauncher, Supervisor, SupervisorState};
use crate::upstream::Notification;
use crate::watcher::{classify, FileWatcher, WatchEvent};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{Diagnostic, MessageType, PublishDiagnosticsParams, Url};
use tracing::{debug, error, info, trace, warn};
use veneer_sourcemap::{
    Direction, FileRole, FsTableSource, MappingStore, PathScheme, PositionTranslator,
    SourceMapError, SystemClock,
};

/// Something the editor should be told.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Replace the diagnostics of a document.
    Diagnostics {
        uri: Url,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    },
    ShowMessage { typ: MessageType, message: String },
    LogMessage { typ: MessageType, message: String },
}

/// Workspace root from `initialize` parameters.
pub fn workspace_root(params: &Value) -> Option<PathBuf> {
    let from_uri = |uri: Option<&Value>| {
        uri.and_then(Value::as_str)
            .and_then(|s| Url::parse(s).ok())
            .and_then(|u| u.to_file_path().ok())
    };
    from_uri(params.get("rootUri"))
        .or_else(|| from_uri(params.pointer("/workspaceFolders/0/uri")))
        .or_else(|| {
            params
                .get("rootPath")
                .and_then(Value::as_str)
                .map(PathBuf::from)
        })
}

/// The protocol bridge.
pub struct Bridge {
    config: BridgeConfig,
    supervisor: Arc<Supervisor>,
    store: Arc<MappingStore>,
    translator: PositionTranslator,
    regenerator: Regenerator,
    debouncer: Debouncer,
    events: mpsc::UnboundedSender<BridgeEvent>,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
    settled: Mutex<Option<mpsc::UnboundedReceiver<PathBuf>>>,
    initialized: AtomicBool,
    /// Open surface documents and their editor versions.
    surfaces: DashMap<Url, i32>,
    /// Diagnostics from the analysis tool, keyed by surface (or foreign) URI.
    tool_diagnostics: DashMap<Url, Vec<Diagnostic>>,
    /// Diagnostics from failed regenerations, keyed by surface URI.
    regeneration_diagnostics: DashMap<Url, Vec<Diagnostic>>,
    /// Sidecars already reported as too new.
    reported_schema: DashMap<PathBuf, ()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Build a bridge around a launcher. Must be called inside a tokio runtime.
    pub fn new(
        config: BridgeConfig,
        launcher: impl Launcher + 'static,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (supervisor, notifications) =
            Supervisor::new(launcher, config.max_restarts, config.request_timeout());
        let store = Arc::new(MappingStore::new(
            FsTableSource,
            SystemClock,
            config.paths.clone(),
        ));
        let translator = PositionTranslator::new(Arc::clone(&store));
        let regenerator = Regenerator::new(&config, Arc::clone(&store));
        let (debouncer, settled) = Debouncer::new(config.debounce());
        let (events, events_rx) = mpsc::unbounded_channel();

        let bridge = Arc::new(Self {
            config,
            supervisor,
            store,
            translator,
            regenerator,
            debouncer,
            events,
            notifications: Mutex::new(Some(notifications)),
            settled: Mutex::new(Some(settled)),
            initialized: AtomicBool::new(false),
            surfaces: DashMap::new(),
            tool_diagnostics: DashMap::new(),
            regeneration_diagnostics: DashMap::new(),
            reported_schema: DashMap::new(),
            workers: Mutex::new(Vec::new()),
        });
        (bridge, events_rx)
    }

    /// Bridge running the configured analysis tool as a child process.
    pub fn with_process(
        config: BridgeConfig,
        root: Option<&Path>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeEvent>) {
        let mut launcher =
            ProcessLauncher::new(config.analysis_command.clone(), config.analysis_args.clone());
        if let Some(root) = root {
            launcher = launcher.with_cwd(root);
        }
        Self::new(config, launcher)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn scheme(&self) -> &PathScheme {
        &self.config.paths
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    pub fn translator(&self) -> &PositionTranslator {
        &self.translator
    }

    /// Start the analysis tool and the background workers.
    ///
    /// Returns the tool's `initialize` result, or `Null` if it could not be
    /// started; the bridge then runs degraded but regeneration still works.
    pub async fn initialize(self: &Arc<Self>, mut params: Value) -> BridgeResult<Value> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::Protocol("bridge already initialized".to_string()));
        }

        let root = workspace_root(&params);
        if let Value::Object(map) = &mut params {
            if let Some(options) = strip_bridge_options(map.remove("initializationOptions")) {
                map.insert("initializationOptions".to_string(), options);
            }
        }

        self.spawn_workers(root);

        match self.supervisor.start(params).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Analysis tool unavailable: {}", e);
                self.show(MessageType::ERROR, e.to_string());
                Ok(Value::Null)
            }
        }
    }

    fn spawn_workers(self: &Arc<Self>, root: Option<PathBuf>) {
        let mut workers = Vec::new();

        if let Some(mut notifications) = self.notifications.lock().take() {
            let bridge = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                while let Some(notification) = notifications.recv().await {
                    bridge.handle_notification(notification);
                }
            }));
        }

        if let Some(mut settled) = self.settled.lock().take() {
            let bridge = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                while let Some(path) = settled.recv().await {
                    let bridge = Arc::clone(&bridge);
                    tokio::spawn(async move {
                        let _ = bridge.regenerate(&path).await;
                    });
                }
            }));
        }

        let mut states = self.supervisor.subscribe();
        let bridge = Arc::clone(self);
        workers.push(tokio::spawn(async move {
            let mut previous = *states.borrow_and_update();
            while states.changed().await.is_ok() {
                let current = *states.borrow_and_update();
                match (previous, current) {
                    (_, SupervisorState::Failed) if previous != SupervisorState::Failed => {
                        let message = BridgeError::Degraded {
                            restarts: bridge.supervisor.restarts_used(),
                        }
                        .to_string();
                        bridge.show(MessageType::ERROR, message);
                    }
                    (SupervisorState::Restarting, SupervisorState::Ready) => {
                        bridge.log(MessageType::INFO, "Analysis tool restarted".to_string());
                    }
                    _ => {}
                }
                previous = current;
            }
        }));

        if let Some(root) = root.filter(|_| self.config.watch) {
            match FileWatcher::new(&root, self.config.paths.clone(), WATCHER_COALESCE_MS) {
                Ok(mut watcher) => {
                    let bridge = Arc::clone(self);
                    workers.push(tokio::spawn(async move {
                        while let Some(event) = watcher.recv().await {
                            bridge.handle_watch_event(event);
                        }
                    }));
                }
                Err(e) => warn!("Workspace watching disabled: {}", e),
            }
        }

        self.workers.lock().extend(workers);
    }

    /// Forward a document request to the analysis tool.
    ///
    /// Requests on surface files are translated to the generated file and
    /// their results translated back. A surface file that has not been
    /// generated yet schedules regeneration and yields `null`.
    pub async fn forward_request(
        &self,
        method: &str,
        uri: &Url,
        mut params: Value,
    ) -> BridgeResult<Value> {
        let path = uri.to_file_path().ok();
        let role = path
            .as_deref()
            .map_or(FileRole::Other, |p| self.scheme().role(p));

        // Bare positions in non-surface documents stay as they are.
        let mut context = PathBuf::new();
        if let (FileRole::Surface, Some(path)) = (role, path.as_deref()) {
            match self
                .translator
                .translate_payload(&mut params, path, Direction::SurfaceToGenerated)
            {
                Ok(()) => {}
                Err(e) if e.is_not_generated() => {
                    debug!("{} requested before {} was generated", method, path.display());
                    self.schedule_regeneration(path);
                    return Ok(Value::Null);
                }
                Err(e) => return Err(self.report(e)),
            }
            context = self.scheme().generated_for(path);
        }

        let mut result = self.supervisor.request(method, params).await?;
        self.translator
            .translate_payload(&mut result, &context, Direction::GeneratedToSurface)
            .map_err(|e| self.report(e))?;
        Ok(result)
    }

    /// Forward a request that carries no document, unchanged.
    pub async fn forward_raw(&self, method: &str, params: Value) -> BridgeResult<Value> {
        self.supervisor.request(method, params).await
    }

    pub async fn did_open(&self, uri: Url, version: i32, text: String) {
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        match self.scheme().role(&path) {
            FileRole::Surface => {
                self.surfaces.insert(uri, version);
                let generated = self.scheme().generated_for(&path);
                match self.store.get(&generated) {
                    Ok(_) => self.open_generated(&generated).await,
                    Err(e) if e.is_not_generated() => {
                        if self.config.regenerate_on_open {
                            info!("{} has no mapping yet, regenerating", path.display());
                            self.schedule_regeneration(&path);
                        }
                    }
                    Err(e) => {
                        self.report(e);
                    }
                }
            }
            FileRole::Generated => self.supervisor.open_document(uri, text),
            FileRole::Other => trace!("Ignoring open of {}", uri),
        }
    }

    pub fn did_change(&self, uri: &Url, version: i32, text: Option<String>) {
        if let Some(mut entry) = self.surfaces.get_mut(uri) {
            *entry = version;
            return;
        }
        if let Some(text) = text {
            self.supervisor.change_document(uri, text);
        }
    }

    pub fn did_save(&self, uri: &Url) {
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        if self.scheme().is_surface(&path) {
            debug!("Surface saved: {}", path.display());
            self.schedule_regeneration(&path);
        }
    }

    pub fn did_close(&self, uri: &Url) {
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        match self.scheme().role(&path) {
            FileRole::Surface => {
                self.surfaces.remove(uri);
                let generated = self.scheme().generated_for(&path);
                if let Ok(generated_uri) = Url::from_file_path(&generated) {
                    self.supervisor.close_document(&generated_uri);
                }
                self.tool_diagnostics.remove(uri);
                self.regeneration_diagnostics.remove(uri);
                self.emit(BridgeEvent::Diagnostics {
                    uri: uri.clone(),
                    diagnostics: Vec::new(),
                    version: None,
                });
            }
            FileRole::Generated => {
                self.supervisor.close_document(uri);
            }
            FileRole::Other => {}
        }
    }

    /// Editor-reported file changes.
    pub fn did_change_watched_files(&self, uris: &[Url]) {
        for uri in uris {
            if let Some(event) = uri
                .to_file_path()
                .ok()
                .and_then(|p| classify(self.scheme(), &p))
            {
                self.handle_watch_event(event);
            }
        }
    }

    /// Queue a surface file for debounced regeneration.
    pub fn schedule_regeneration(&self, surface: &Path) {
        self.debouncer.trigger(surface);
    }

    /// Regenerate a surface file now and propagate the outcome.
    pub async fn regenerate(&self, surface: &Path) -> BridgeResult<RegenerationOutcome> {
        let uri = Url::from_file_path(surface).map_err(|_| {
            BridgeError::Protocol(format!("'{}' is not an absolute path", surface.display()))
        })?;

        match self.regenerator.regenerate(surface).await {
            Ok(outcome) => {
                self.reported_schema.remove(&self.scheme().map_path(&outcome.generated));
                if self.regeneration_diagnostics.remove(&uri).is_some() {
                    self.publish(&uri);
                }
                self.sync_generated(&uri, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Regeneration of {} failed: {}", surface.display(), e);
                self.regeneration_diagnostics
                    .insert(uri.clone(), diagnostics_for_error(surface, &e));
                self.publish(&uri);
                Err(e)
            }
        }
    }

    /// Handle `workspace/executeCommand`.
    pub async fn execute_command(
        &self,
        command: &str,
        arguments: &[Value],
    ) -> BridgeResult<Option<Value>> {
        match command {
            REGENERATE_COMMAND => {
                let targets: Vec<PathBuf> = match arguments.first().and_then(Value::as_str) {
                    Some(uri) => {
                        let path = Url::parse(uri)
                            .ok()
                            .and_then(|u| u.to_file_path().ok())
                            .ok_or_else(|| {
                                BridgeError::Protocol(format!("invalid document URI '{}'", uri))
                            })?;
                        vec![path]
                    }
                    None => self
                        .surfaces
                        .iter()
                        .filter_map(|entry| entry.key().to_file_path().ok())
                        .collect(),
                };
                for target in &targets {
                    self.regenerate(target).await?;
                }
                Ok(Some(json!({ "regenerated": targets.len() })))
            }
            RESTART_COMMAND => {
                self.supervisor.restart().await?;
                Ok(None)
            }
            other => Err(BridgeError::Protocol(format!("unknown command '{}'", other))),
        }
    }

    /// Stop the analysis tool and every worker.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        info!("Bridge shut down");
    }

    async fn open_generated(&self, generated: &Path) {
        let Ok(uri) = Url::from_file_path(generated) else {
            return;
        };
        match tokio::fs::read_to_string(generated).await {
            Ok(text) => self.supervisor.open_document(uri, text),
            Err(e) => warn!("Cannot open {}: {}", generated.display(), e),
        }
    }

    /// Tell the analysis tool the generated file changed.
    fn sync_generated(&self, surface_uri: &Url, outcome: &RegenerationOutcome) {
        let Ok(generated_uri) = Url::from_file_path(&outcome.generated) else {
            return;
        };
        if self.supervisor.is_document_open(&generated_uri) {
            self.supervisor
                .change_document(&generated_uri, outcome.generated_text.clone());
        } else if self.surfaces.contains_key(surface_uri) {
            self.supervisor
                .open_document(generated_uri, outcome.generated_text.clone());
        } else {
            self.supervisor.notify(
                "workspace/didChangeWatchedFiles",
                json!({"changes": [{"uri": generated_uri, "type": FILE_CHANGE_TYPE_CHANGED}]}),
            );
        }
    }

    fn handle_watch_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::SurfaceChanged(path) => self.schedule_regeneration(&path),
            WatchEvent::MappingChanged(generated) => {
                if self.store.invalidate(&generated) {
                    debug!("Mapping for {} changed on disk", generated.display());
                }
            }
        }
    }

    fn handle_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                if let Err(e) = self.handle_tool_diagnostics(notification.params) {
                    warn!("Dropped analysis tool diagnostics: {}", e);
                }
            }
            "window/showMessage" | "window/logMessage" => {
                let typ = notification
                    .params
                    .get("type")
                    .cloned()
                    .and_then(|t| serde_json::from_value(t).ok())
                    .unwrap_or(MessageType::INFO);
                let message = notification
                    .params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if notification.method == "window/showMessage" {
                    self.emit(BridgeEvent::ShowMessage { typ, message });
                } else {
                    self.emit(BridgeEvent::LogMessage { typ, message });
                }
            }
            other => trace!("Ignoring analysis tool notification '{}'", other),
        }
    }

    fn handle_tool_diagnostics(&self, params: Value) -> BridgeResult<()> {
        let params: PublishDiagnosticsParams = serde_json::from_value(params)?;
        let path = params.uri.to_file_path().ok();

        let target = match &path {
            Some(path) if self.scheme().role(path) == FileRole::Generated => self
                .translator
                .translate_uri(&params.uri, Direction::GeneratedToSurface)?
                .map(|surface| (surface, path.clone())),
            _ => None,
        };

        let Some((surface_uri, generated)) = target else {
            // Not ours; relay unchanged.
            self.emit(BridgeEvent::Diagnostics {
                uri: params.uri,
                diagnostics: params.diagnostics,
                version: params.version,
            });
            return Ok(());
        };

        let mut value = serde_json::to_value(&params.diagnostics)?;
        self.translator
            .translate_payload(&mut value, &generated, Direction::GeneratedToSurface)?;
        let diagnostics: Vec<Diagnostic> = serde_json::from_value(value)?;
        debug!(
            "Translated {} diagnostics for {}",
            diagnostics.len(),
            surface_uri
        );
        self.tool_diagnostics.insert(surface_uri.clone(), diagnostics);
        self.publish(&surface_uri);
        Ok(())
    }

    /// Publish the merged regeneration and tool diagnostics of a document.
    fn publish(&self, uri: &Url) {
        let mut diagnostics = self
            .regeneration_diagnostics
            .get(uri)
            .map(|d| d.value().clone())
            .unwrap_or_default();
        if let Some(tool) = self.tool_diagnostics.get(uri) {
            diagnostics.extend(tool.iter().cloned());
        }
        let version = self.surfaces.get(uri).map(|v| *v);
        self.emit(BridgeEvent::Diagnostics {
            uri: uri.clone(),
            diagnostics,
            version,
        });
    }

    /// Log an error and tell the user about the ones that need action.
    fn report(&self, error: SourceMapError) -> BridgeError {
        if let SourceMapError::UnsupportedSchemaVersion { path, .. } = &error {
            if self.reported_schema.insert(path.clone(), ()).is_none() {
                self.show(MessageType::ERROR, error.to_string());
            }
        }
        warn!("{}", error);
        error.into()
    }

    fn show(&self, typ: MessageType, message: String) {
        self.emit(BridgeEvent::ShowMessage { typ, message });
    }

    fn log(&self, typ: MessageType, message: String) {
        self.emit(BridgeEvent::LogMessage { typ, message });
    }

    fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            trace!("Bridge event receiver dropped");
        }
    }
}
