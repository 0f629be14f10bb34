//! Incremental filtering against a persistent key-value store.
//!
//! Commands whose fingerprint already has a store entry were captured by
//! an earlier run and are dropped, unless the caller asks for everything
//! to be treated as stale.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::CompileCommand;

/// What the store remembers about one captured command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildMetadata {
    pub file: PathBuf,
    pub directory: PathBuf,
    pub command: String,
}

impl BuildMetadata {
    pub fn of(command: &CompileCommand) -> Self {
        BuildMetadata {
            file: command.file.clone(),
            directory: command.directory.clone(),
            command: command.command.clone(),
        }
    }
}

/// Key-value store of previously captured commands, keyed by fingerprint.
pub trait IncrementalStore {
    fn contains(&self, fingerprint: &str) -> bool;
    fn record(&mut self, fingerprint: &str, metadata: BuildMetadata);
}

/// File-backed store serialized as one JSON object.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    entries: BTreeMap<String, BuildMetadata>,
}

impl JsonStore {
    /// Load the store at `path`, or start empty when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read store: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("malformed store: {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(JsonStore {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Persist the store back to its file.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        crate::util::fs::write_string(&self.path, &json)
            .with_context(|| format!("failed to write store: {}", self.path.display()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IncrementalStore for JsonStore {
    fn contains(&self, fingerprint: &str) -> bool {
        self.entries.contains_key(fingerprint)
    }

    fn record(&mut self, fingerprint: &str, metadata: BuildMetadata) {
        self.entries.insert(fingerprint.to_string(), metadata);
    }
}

/// Keep only the commands the store has not seen. With `update_all` the
/// store is ignored and every command is considered stale.
pub fn filter_stale(
    commands: Vec<CompileCommand>,
    store: &dyn IncrementalStore,
    update_all: bool,
) -> Vec<CompileCommand> {
    if update_all {
        return commands;
    }
    let total = commands.len();
    let stale: Vec<CompileCommand> = commands
        .into_iter()
        .filter(|cmd| !store.contains(&cmd.fingerprint))
        .collect();
    tracing::debug!("{} of {total} command(s) are stale", stale.len());
    stale
}
