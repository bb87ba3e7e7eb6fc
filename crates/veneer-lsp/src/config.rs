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

//! Bridge configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. [`BridgeConfig::default`]
//! 2. `initializationOptions.veneer` sent by the editor
//! 3. command-line flags ([`ConfigOverrides`])
//!
//! ```json
//! {
//!   "initializationOptions": {
//!     "veneer": {
//!       "analysisCommand": "gopls",
//!       "transformCommand": "veneer",
//!       "transformArgs": ["build", "{surface}", "-o", "{generated}"],
//!       "debounceMs": 250,
//!       "paths": {"surfaceExtension": "vnr"}
//!     }
//!   }
//! }
//! ```

use crate::constants::*;
use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use veneer_sourcemap::PathScheme;

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Analysis tool program.
    pub analysis_command: String,
    /// Analysis tool arguments.
    pub analysis_args: Vec<String>,
    /// Transform program.
    pub transform_command: String,
    /// Transform arguments; `{surface}` and `{generated}` are substituted.
    pub transform_args: Vec<String>,
    /// File naming rules.
    pub paths: PathScheme,
    pub debounce_ms: u64,
    pub regeneration_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_restarts: u32,
    /// Watch the workspace for surface file changes made outside the editor.
    pub watch: bool,
    /// Regenerate a surface file on open when it has no mapping yet.
    pub regenerate_on_open: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            analysis_command: DEFAULT_ANALYSIS_COMMAND.to_string(),
            analysis_args: Vec::new(),
            transform_command: DEFAULT_TRANSFORM_COMMAND.to_string(),
            transform_args: DEFAULT_TRANSFORM_ARGS.iter().map(|s| s.to_string()).collect(),
            paths: PathScheme::default(),
            debounce_ms: DEBOUNCE_MS,
            regeneration_timeout_secs: REGENERATION_TIMEOUT_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            watch: true,
            regenerate_on_open: true,
        }
    }
}

impl BridgeConfig {
    /// Overlay `initializationOptions.veneer` onto this configuration.
    ///
    /// Only keys present in the options change; everything else keeps its
    /// current value.
    pub fn merge_initialization_options(&mut self, options: Option<&Value>) -> BridgeResult<()> {
        let Some(overlay) = options
            .and_then(|o| o.get(INITIALIZATION_OPTIONS_KEY))
            .filter(|o| !o.is_null())
        else {
            return Ok(());
        };
        let Value::Object(overlay) = overlay else {
            return Err(BridgeError::Protocol(format!(
                "initializationOptions.{} must be an object",
                INITIALIZATION_OPTIONS_KEY
            )));
        };

        let mut merged = serde_json::to_value(&*self)?;
        merge_objects(&mut merged, overlay);
        *self = serde_json::from_value(merged)?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn regeneration_timeout(&self) -> Duration {
        Duration::from_secs(self.regeneration_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Transform arguments with placeholders substituted.
    pub fn transform_args_for(&self, surface: &Path, generated: &Path) -> Vec<String> {
        let surface = surface.display().to_string();
        let generated = generated.display().to_string();
        self.transform_args
            .iter()
            .map(|arg| {
                arg.replace(SURFACE_PLACEHOLDER, &surface)
                    .replace(GENERATED_PLACEHOLDER, &generated)
            })
            .collect()
    }
}

/// Recursive object merge; non-object values replace.
fn merge_objects(base: &mut Value, overlay: &serde_json::Map<String, Value>) {
    let Value::Object(base) = base else {
        return;
    };
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(existing @ Value::Object(_)), Value::Object(inner)) => {
                merge_objects(existing, inner)
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Command-line settings that win over everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub analysis_command: Option<String>,
    pub analysis_args: Option<Vec<String>>,
    pub transform_command: Option<String>,
    pub transform_args: Option<Vec<String>>,
    pub debounce_ms: Option<u64>,
    pub regeneration_timeout_secs: Option<u64>,
    pub max_restarts: Option<u32>,
    pub no_watch: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(command) = &self.analysis_command {
            config.analysis_command = command.clone();
        }
        if let Some(args) = &self.analysis_args {
            config.analysis_args = args.clone();
        }
        if let Some(command) = &self.transform_command {
            config.transform_command = command.clone();
        }
        if let Some(args) = &self.transform_args {
            config.transform_args = args.clone();
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
        if let Some(secs) = self.regeneration_timeout_secs {
            config.regeneration_timeout_secs = secs;
        }
        if let Some(max) = self.max_restarts {
            config.max_restarts = max;
        }
        if self.no_watch {
            config.watch = false;
        }
    }
}

/// Initialization options with the bridge's own key removed.
pub fn strip_bridge_options(options: Option<Value>) -> Option<Value> {
    match options {
        Some(Value::Object(mut map)) => {
            map.remove(INITIALIZATION_OPTIONS_KEY);
            if map.is_empty() {
                None
            } else {
                Some(Value::Object(map))
            }
        }
        other => other,
    }
}
