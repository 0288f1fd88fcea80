// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::Path;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;

pub const DEFAULT_CONFIG_PATH: &str = "studeck.toml";

#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the SQLite database.
    pub database: PathBuf,
    /// Address the HTTP server listens on.
    pub bind: String,
    /// How many due cards to return when the caller gives no limit.
    pub due_limit: usize,
    /// Fixes session shuffles, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("studeck.db"),
            bind: "127.0.0.1:8000".to_string(),
            due_limit: 50,
            seed: None,
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicitly given path must exist. Without one, `studeck.toml` in
    /// the working directory is read if it is there, and the defaults are
    /// used otherwise.
    pub fn load(path: Option<&Path>) -> Fallible<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return fail(format!(
                        "configuration file {} does not exist.",
                        path.display()
                    ));
                }
                path.to_path_buf()
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !path.exists() {
                    log::debug!("No {DEFAULT_CONFIG_PATH}, using defaults.");
                    return Ok(Self::default());
                }
                path
            }
        };
        log::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Fallible<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn database_path(&self) -> Fallible<&str> {
        match self.database.to_str() {
            Some(path) => Ok(path),
            None => fail("database path is not valid UTF-8."),
        }
    }

    /// The generator for a study session: seeded if configured, from OS
    /// entropy otherwise.
    pub fn session_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
