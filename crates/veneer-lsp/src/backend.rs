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

//! LSP backend implementation.
//!
//! The editor talks to [`VeneerLanguageServer`]; every document request is
//! handed to the [`Bridge`], which translates it for the analysis tool and
//! translates the answer back. Bridge events (diagnostics, messages) are
//! pumped to the editor by a background task.

use crate::bridge::{workspace_root, Bridge, BridgeEvent};
use crate::config::{BridgeConfig, ConfigOverrides};
use crate::constants::{REGENERATE_COMMAND, RESTART_COMMAND};
use crate::error::BridgeError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};

/// Veneer language server backend.
pub struct VeneerLanguageServer {
    /// LSP client connection.
    client: Client,
    /// Settings before the editor's initialization options.
    base: BridgeConfig,
    /// Command-line settings applied last.
    overrides: ConfigOverrides,
    /// Created on `initialize`, once the workspace is known.
    bridge: OnceLock<Arc<Bridge>>,
}

impl VeneerLanguageServer {
    /// Create a language server with default configuration.
    pub fn new(client: Client) -> Self {
        Self::with_config(client, BridgeConfig::default(), ConfigOverrides::default())
    }

    /// Create a language server with a base configuration and overrides.
    ///
    /// The editor's `initializationOptions.veneer` is layered between the two.
    pub fn with_config(client: Client, base: BridgeConfig, overrides: ConfigOverrides) -> Self {
        Self {
            client,
            base,
            overrides,
            bridge: OnceLock::new(),
        }
    }

    fn bridge(&self) -> Result<&Arc<Bridge>> {
        self.bridge
            .get()
            .ok_or_else(|| BridgeError::Protocol("server not initialized".to_string()).into())
    }

    fn spawn_event_pump(&self, mut events: mpsc::UnboundedReceiver<BridgeEvent>) {
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    BridgeEvent::Diagnostics {
                        uri,
                        diagnostics,
                        version,
                    } => client.publish_diagnostics(uri, diagnostics, version).await,
                    BridgeEvent::ShowMessage { typ, message } => {
                        client.show_message(typ, message).await
                    }
                    BridgeEvent::LogMessage { typ, message } => {
                        client.log_message(typ, message).await
                    }
                }
            }
        });
    }

    /// Forward a document request and decode the translated answer.
    async fn forward<P, R>(&self, method: &str, uri: &Url, params: P) -> Result<Option<R>>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let bridge = self.bridge()?;
        let params = serde_json::to_value(params).map_err(BridgeError::from)?;
        let result = bridge.forward_request(method, uri, params).await?;
        if result.is_null() {
            return Ok(None);
        }
        let decoded = serde_json::from_value(result).map_err(BridgeError::from)?;
        Ok(Some(decoded))
    }
}

fn trigger_characters(upstream: &Value, pointer: &str, fallback: &[&str]) -> Vec<String> {
    upstream
        .pointer(pointer)
        .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
        .unwrap_or_else(|| fallback.iter().map(|s| s.to_string()).collect())
}

/// Capabilities advertised to the editor, seeded from the analysis tool's.
pub fn server_capabilities(upstream: &Value) -> ServerCapabilities {
    let resolve = upstream
        .pointer("/capabilities/completionProvider/resolveProvider")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::FULL),
                will_save: None,
                will_save_wait_until: None,
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(false),
                })),
            },
        )),
        completion_provider: Some(CompletionOptions {
            resolve_provider: Some(resolve),
            trigger_characters: Some(trigger_characters(
                upstream,
                "/capabilities/completionProvider/triggerCharacters",
                &["."],
            )),
            work_done_progress_options: Default::default(),
            all_commit_characters: None,
            completion_item: None,
        }),
        signature_help_provider: Some(SignatureHelpOptions {
            trigger_characters: Some(trigger_characters(
                upstream,
                "/capabilities/signatureHelpProvider/triggerCharacters",
                &["(", ","],
            )),
            retrigger_characters: None,
            work_done_progress_options: Default::default(),
        }),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        definition_provider: Some(OneOf::Left(true)),
        type_definition_provider: Some(TypeDefinitionProviderCapability::Simple(true)),
        implementation_provider: Some(ImplementationProviderCapability::Simple(true)),
        references_provider: Some(OneOf::Left(true)),
        document_highlight_provider: Some(OneOf::Left(true)),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: vec![REGENERATE_COMMAND.to_string(), RESTART_COMMAND.to_string()],
            work_done_progress_options: Default::default(),
        }),
        ..Default::default()
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for VeneerLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!("Veneer Language Server initializing");

        let mut config = self.base.clone();
        config.merge_initialization_options(params.initialization_options.as_ref())?;
        self.overrides.apply(&mut config);
        debug!("Effective configuration: {:?}", config);

        let raw = serde_json::to_value(&params).map_err(BridgeError::from)?;
        let root = workspace_root(&raw);
        let (bridge, events) = Bridge::with_process(config, root.as_deref());
        if self.bridge.set(Arc::clone(&bridge)).is_err() {
            return Err(BridgeError::Protocol("initialize sent twice".to_string()).into());
        }
        self.spawn_event_pump(events);

        let upstream = bridge.initialize(raw).await?;
        Ok(InitializeResult {
            capabilities: server_capabilities(&upstream),
            server_info: Some(ServerInfo {
                name: "veneer-lsp".to_string(),
                version: Some(crate::VERSION.to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("Veneer Language Server initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Veneer Language Server shutting down");
        if let Some(bridge) = self.bridge.get() {
            bridge.shutdown().await;
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        info!(
            "Document opened: {} ({} bytes)",
            document.uri,
            document.text.len()
        );
        if let Some(bridge) = self.bridge.get() {
            bridge
                .did_open(document.uri, document.version, document.text)
                .await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params.content_changes.into_iter().last().map(|c| c.text);
        if text.is_none() {
            warn!("Document change event for {} had no content changes", uri);
        }
        if let Some(bridge) = self.bridge.get() {
            bridge.did_change(&uri, params.text_document.version, text);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        debug!("Document saved: {}", params.text_document.uri);
        if let Some(bridge) = self.bridge.get() {
            bridge.did_save(&params.text_document.uri);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        debug!("Document closed: {}", params.text_document.uri);
        if let Some(bridge) = self.bridge.get() {
            bridge.did_close(&params.text_document.uri);
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        if let Some(bridge) = self.bridge.get() {
            let uris: Vec<Url> = params.changes.into_iter().map(|c| c.uri).collect();
            bridge.did_change_watched_files(&uris);
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri.clone();
        self.forward("textDocument/completion", &uri, params).await
    }

    async fn completion_resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        let bridge = self.bridge()?;
        let params = serde_json::to_value(&item).map_err(BridgeError::from)?;
        let result = bridge.forward_raw("completionItem/resolve", params).await?;
        if result.is_null() {
            return Ok(item);
        }
        Ok(serde_json::from_value(result).map_err(BridgeError::from)?)
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        self.forward("textDocument/hover", &uri, params).await
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        self.forward("textDocument/signatureHelp", &uri, params).await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        self.forward("textDocument/definition", &uri, params).await
    }

    async fn goto_type_definition(
        &self,
        params: request::GotoTypeDefinitionParams,
    ) -> Result<Option<request::GotoTypeDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        self.forward("textDocument/typeDefinition", &uri, params).await
    }

    async fn goto_implementation(
        &self,
        params: request::GotoImplementationParams,
    ) -> Result<Option<request::GotoImplementationResponse>> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        self.forward("textDocument/implementation", &uri, params).await
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri.clone();
        self.forward("textDocument/references", &uri, params).await
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let uri = params.text_document_position_params.text_document.uri.clone();
        self.forward("textDocument/documentHighlight", &uri, params).await
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        info!("Executing command {}", params.command);
        let bridge = self.bridge()?;
        match bridge.execute_command(&params.command, &params.arguments).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_user_facing() {
                    self.client.show_message(MessageType::ERROR, e.to_string()).await;
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capabilities_take_upstream_triggers() {
        let upstream = json!({
            "capabilities": {
                "completionProvider": {"triggerCharacters": ["."], "resolveProvider": true},
                "signatureHelpProvider": {"triggerCharacters": ["(", ",", " "]}
            }
        });
        let caps = server_capabilities(&upstream);
        let completion = caps.completion_provider.unwrap();
        assert_eq!(completion.resolve_provider, Some(true));
        assert_eq!(completion.trigger_characters, Some(vec![".".to_string()]));
        assert_eq!(
            caps.signature_help_provider.unwrap().trigger_characters.unwrap().len(),
            3
        );
    }

    #[test]
    fn test_capabilities_without_upstream() {
        let caps = server_capabilities(&Value::Null);
        assert_eq!(
            caps.completion_provider.unwrap().resolve_provider,
            Some(false)
        );
        let commands = caps.execute_command_provider.unwrap().commands;
        assert!(commands.contains(&REGENERATE_COMMAND.to_string()));
        assert!(commands.contains(&RESTART_COMMAND.to_string()));
    }
}
