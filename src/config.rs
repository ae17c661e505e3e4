// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime configuration for the builder and server.
//!
//! No config-file layer: every field comes straight off the command line
//! (spec.md §9, Open Question O3). This is narrower than some sibling tools
//! in this codebase, which load TOML/JSON files; this core has nothing that
//! needs tuning beyond a couple of paths.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from validating a `BuilderConfig`/`ServerConfig` at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no ROA input directories configured")]
    NoRoaDirs,

    #[error("ROA directory does not exist: {0}")]
    RoaDirMissing(PathBuf),

    #[error("data directory does not exist: {0}")]
    DataDirMissing(PathBuf),
}

/// Configuration for one `rtr-rib builder` invocation (spec.md §4.2, §6.4).
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Directories to scan recursively for `*.roa` files.
    pub roa_dirs: Vec<PathBuf>,
    /// Where AXFR/IXFR files and `current` live.
    pub data_dir: PathBuf,
}

impl BuilderConfig {
    /// Validates `roa_dirs` is non-empty and that every `roa_dir` and
    /// `data_dir` exists (spec.md §6.5).
    pub fn new(roa_dirs: Vec<PathBuf>, data_dir: PathBuf) -> Result<Self, ConfigError> {
        if roa_dirs.is_empty() {
            return Err(ConfigError::NoRoaDirs);
        }
        for dir in &roa_dirs {
            if !dir.is_dir() {
                return Err(ConfigError::RoaDirMissing(dir.clone()));
            }
        }
        if !data_dir.is_dir() {
            return Err(ConfigError::DataDirMissing(data_dir));
        }
        Ok(Self { roa_dirs, data_dir })
    }
}

/// Configuration for one `rtr-rib server` invocation (spec.md §4.3, §6.4).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where AXFR/IXFR files and `current` live. Shared with the builder
    /// that feeds this server.
    pub data_dir: PathBuf,
    /// Where this server's `wakeup.<pid>` socket is created.
    pub wakeup_dir: PathBuf,
}

impl ServerConfig {
    /// Validates that `data_dir` exists (spec.md §6.5). `wakeup_dir` is not
    /// required to exist yet: `WakeupSocket::bind` creates it.
    pub fn new(data_dir: PathBuf, wakeup_dir: PathBuf) -> Result<Self, ConfigError> {
        if !data_dir.is_dir() {
            return Err(ConfigError::DataDirMissing(data_dir));
        }
        Ok(Self { data_dir, wakeup_dir })
    }
}
