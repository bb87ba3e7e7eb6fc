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

//! Veneer Language Server binary.
//!
//! # Usage
//!
//! ```bash
//! # Run the language server (stdio transport)
//! veneer-lsp
//!
//! # Generate a mapping sidecar without an editor
//! veneer-lsp map src/main.vnr src/main.go --records src/main.go.records.json
//!
//! # With debug logging
//! RUST_LOG=debug veneer-lsp
//! ```
//!
//! # Editor Integration
//!
//! ## Neovim (nvim-lspconfig)
//!
//! ```lua
//! require('lspconfig.configs').veneer = {
//!   default_config = {
//!     cmd = { 'veneer-lsp' },
//!     filetypes = { 'veneer' },
//!     root_dir = require('lspconfig.util').root_pattern('go.mod'),
//!     init_options = { veneer = { transformCommand = 'veneer' } },
//!   },
//! }
//! require('lspconfig').veneer.setup {}
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;
use veneer_lsp::{BridgeConfig, ConfigOverrides, VeneerLanguageServer};
use veneer_sourcemap::{load_records, GeneratorInput, MappingGenerator, PathScheme};

#[derive(Parser)]
#[command(name = "veneer-lsp")]
#[command(author = "Dweve B.V.")]
#[command(version)]
#[command(about = "Language server bridge for Veneer surface files")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Run the language server on stdio (default)
    Serve,
    /// Generate the mapping sidecar for a surface/generated pair
    Map {
        /// Surface file
        surface: PathBuf,
        /// Generated Go file
        generated: PathBuf,
        /// Transformation records (default: <generated>.records.json)
        #[arg(long)]
        records: Option<PathBuf>,
        /// Output path (default: <generated>.map)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Analysis tool program
    #[arg(long, global = true)]
    analysis_command: Option<String>,

    /// Analysis tool argument (repeatable)
    #[arg(long = "analysis-arg", allow_hyphen_values = true, global = true)]
    analysis_args: Vec<String>,

    /// Transform program
    #[arg(long, global = true)]
    transform_command: Option<String>,

    /// Transform argument (repeatable; {surface} and {generated} are substituted)
    #[arg(long = "transform-arg", allow_hyphen_values = true, global = true)]
    transform_args: Vec<String>,

    /// Regeneration debounce window in milliseconds
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Transform timeout in seconds
    #[arg(long, global = true)]
    regeneration_timeout: Option<u64>,

    /// Analysis tool restarts before giving up
    #[arg(long, global = true)]
    max_restarts: Option<u32>,

    /// Do not watch the workspace for file changes
    #[arg(long, global = true)]
    no_watch: bool,

    /// Accepted for editors that always pass it; stdio is the only transport
    #[arg(long, hide = true, global = true)]
    stdio: bool,
}

impl ServeArgs {
    fn overrides(&self) -> ConfigOverrides {
        let non_empty = |args: &Vec<String>| (!args.is_empty()).then(|| args.clone());
        ConfigOverrides {
            analysis_command: self.analysis_command.clone(),
            analysis_args: non_empty(&self.analysis_args),
            transform_command: self.transform_command.clone(),
            transform_args: non_empty(&self.transform_args),
            debounce_ms: self.debounce_ms,
            regeneration_timeout_secs: self.regeneration_timeout,
            max_restarts: self.max_restarts,
            no_watch: self.no_watch,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("veneer_lsp=info".parse().expect("valid log directive"))
                .add_directive("veneer_sourcemap=info".parse().expect("valid log directive"))
                .add_directive("tower_lsp=info".parse().expect("valid log directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Map {
            surface,
            generated,
            records,
            output,
        }) => run_map(surface, generated, records, output),
        Some(Command::Serve) | None => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(cli.serve.overrides()));
            Ok(())
        }
    }
}

async fn serve(overrides: ConfigOverrides) {
    tracing::info!("Starting Veneer Language Server v{}", veneer_lsp::VERSION);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(move |client| {
        VeneerLanguageServer::with_config(client, BridgeConfig::default(), overrides)
    });

    Server::new(stdin, stdout, socket).serve(service).await;
}

fn run_map(
    surface: PathBuf,
    generated: PathBuf,
    records: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scheme = PathScheme::default();
    let records_path = records.unwrap_or_else(|| scheme.records_path(&generated));
    let output = output.unwrap_or_else(|| scheme.map_path(&generated));

    let surface_text = std::fs::read_to_string(&surface)?;
    let generated_text = std::fs::read_to_string(&generated)?;
    let records = load_records(&records_path)?;

    let result = MappingGenerator::new().generate(GeneratorInput {
        surface_path: &surface,
        surface_text: &surface_text,
        generated_path: &generated,
        generated_text: &generated_text,
        records: &records,
    })?;
    result.table.save(&output)?;

    let report = &result.report;
    println!(
        "{}: {} transformations, {} identity entries",
        output.display(),
        report.transformations,
        report.identity_entries
    );
    for marker in &report.missing_markers {
        eprintln!("warning: marker '{}' not found in {}", marker, generated.display());
    }
    if !report.drifted_lines.is_empty() {
        eprintln!(
            "warning: {} surface lines could not be matched in {}",
            report.drifted_lines.len(),
            generated.display()
        );
    }
    Ok(())
}
