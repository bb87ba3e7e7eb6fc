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

//! Veneer Language Server Protocol bridge
//!
//! Veneer files (`.vnr`) are compiled to Go by an external transform. This
//! crate serves them to LSP editors by running a Go language server (gopls by
//! default) on the generated code and translating every position between the
//! two representations with [`veneer_sourcemap`].
//!
//! # Features
//!
//! - **Navigation**: definition, type definition, implementation, references
//!   and document highlights, answered in surface coordinates
//! - **Assistance**: completion, hover and signature help
//! - **Diagnostics**: analysis tool diagnostics mapped back onto the surface
//!   file, plus transform errors parsed into positioned diagnostics
//! - **Regeneration**: debounced rebuild of the generated file and its
//!   mapping on save or external change
//! - **Supervision**: the analysis tool is restarted after crashes, within a
//!   restart budget; once it is spent the bridge degrades until the
//!   `veneer.restartAnalysisTool` command is run
//!
//! # Usage
//!
//! ```bash
//! # Run the bridge (stdio transport)
//! veneer-lsp
//!
//! # Use a different analysis tool and transform
//! veneer-lsp --analysis-command /opt/go/bin/gopls --transform-command vnrc
//!
//! # Build a mapping sidecar offline
//! veneer-lsp map src/main.vnr src/main.go
//!
//! # With debug logging
//! RUST_LOG=debug veneer-lsp
//! ```
//!
//! ## Programmatic Usage
//!
//! ```no_run
//! use veneer_lsp::VeneerLanguageServer;
//! use tower_lsp::{LspService, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stdin = tokio::io::stdin();
//!     let stdout = tokio::io::stdout();
//!
//!     let (service, socket) = LspService::new(VeneerLanguageServer::new);
//!
//!     Server::new(stdin, stdout, socket).serve(service).await;
//! }
//! ```
//!
//! # Architecture
//!
//! - `backend`: tower-lsp server, a thin shell over [`bridge`]
//! - [`bridge`]: request translation, document sync and event fan-out
//! - [`supervisor`]: analysis tool lifecycle and restart budget
//! - [`upstream`] / [`protocol`]: JSON-RPC client over Content-Length framing
//! - [`regenerate`]: transform command, mapping generation, failure diagnostics
//! - [`debounce`] / [`watcher`]: save and file-change batching
//! - [`config`] / [`constants`]: settings and their defaults

mod backend;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod error;
pub mod protocol;
pub mod regenerate;
pub mod supervisor;
pub mod upstream;
pub mod watcher;

pub use backend::{server_capabilities, VeneerLanguageServer};
pub use bridge::{Bridge, BridgeEvent};
pub use config::{BridgeConfig, ConfigOverrides};
pub use error::{BridgeError, BridgeResult};
pub use supervisor::{Launcher, ProcessLauncher, Supervisor, SupervisorState, Transport};

/// LSP server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
