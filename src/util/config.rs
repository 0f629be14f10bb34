//! Configuration file support.
//!
//! Two configuration file locations are supported:
//! - Global: `~/.capture/capture.toml` - User-wide defaults
//! - Project: `.capture/capture.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::CompilerKind;

/// A C / C++ compiler executable pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerPair {
    pub c: String,
    pub cxx: String,
}

impl CompilerPair {
    pub fn for_kind(&self, kind: CompilerKind) -> &str {
        match kind {
            CompilerKind::C => &self.c,
            CompilerKind::Cxx => &self.cxx,
        }
    }
}

/// Options applied to every synthesized command when a project's scripts
/// contribute nothing of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultOptions {
    /// Name of the configured compiler pair to use.
    pub compiler_id: String,

    /// Flags for every compile.
    pub flags: Vec<String>,

    /// Macro definitions for every compile.
    pub macros: Vec<String>,

    /// Extra flags appended for C++ units only.
    pub cxx_flags: Vec<String>,
}

impl Default for DefaultOptions {
    fn default() -> Self {
        DefaultOptions {
            compiler_id: "gnu".to_string(),
            flags: vec!["-g".to_string()],
            macros: Vec::new(),
            cxx_flags: Vec::new(),
        }
    }
}

/// Capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Default options for synthesized commands.
    pub defaults: DefaultOptions,

    /// Named compiler pairs selectable by `compiler_id`.
    pub compilers: BTreeMap<String, CompilerPair>,

    /// Compiler pair used for bitcode-emitting twin commands.
    pub bitcode: CompilerPair,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let mut compilers = BTreeMap::new();
        compilers.insert(
            "gnu".to_string(),
            CompilerPair {
                c: "gcc".to_string(),
                cxx: "g++".to_string(),
            },
        );
        compilers.insert(
            "clang".to_string(),
            CompilerPair {
                c: "clang".to_string(),
                cxx: "clang++".to_string(),
            },
        );
        CaptureConfig {
            defaults: DefaultOptions::default(),
            compilers,
            bitcode: CompilerPair {
                c: "clang".to_string(),
                cxx: "clang++".to_string(),
            },
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a file.
    ///
    /// Values present in the file override the built-in defaults; the
    /// rest keep them, so configuring one compiler pair never discards
    /// the built-in ones.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let overlay: CaptureConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        let mut config = Self::default();
        config.merge(overlay);
        Ok(config)
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: CaptureConfig) {
        let base = CaptureConfig::default();
        if other.defaults.compiler_id != base.defaults.compiler_id {
            self.defaults.compiler_id = other.defaults.compiler_id;
        }
        if other.defaults.flags != base.defaults.flags {
            self.defaults.flags = other.defaults.flags;
        }
        if !other.defaults.macros.is_empty() {
            self.defaults.macros = other.defaults.macros;
        }
        if !other.defaults.cxx_flags.is_empty() {
            self.defaults.cxx_flags = other.defaults.cxx_flags;
        }
        for (id, pair) in other.compilers {
            self.compilers.insert(id, pair);
        }
        if other.bitcode != base.bitcode {
            self.bitcode = other.bitcode;
        }
    }

    /// Look up a compiler pair by name.
    pub fn compiler(&self, id: &str) -> Option<&CompilerPair> {
        self.compilers.get(id)
    }

    /// Resolve a compiler pair by name, falling back to the configured
    /// default when the name is unknown.
    pub fn resolve_compiler(&self, id: &str) -> CompilerPair {
        if let Some(pair) = self.compiler(id) {
            return pair.clone();
        }
        tracing::warn!(
            "unknown compiler id `{id}`, falling back to `{}`",
            self.defaults.compiler_id
        );
        self.compiler(&self.defaults.compiler_id)
            .cloned()
            .unwrap_or_else(|| CompilerPair {
                c: "gcc".to_string(),
                cxx: "g++".to_string(),
            })
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.capture/capture.toml)
/// 2. Global config (~/.capture/capture.toml)
/// 3. Defaults
pub fn load_merged(project_root: &Path) -> CaptureConfig {
    merged_from(
        global_config_path().as_deref(),
        &project_config_path(project_root),
    )
}

fn merged_from(global_path: Option<&Path>, project_path: &Path) -> CaptureConfig {
    let mut config = CaptureConfig::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(CaptureConfig::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(CaptureConfig::load_or_default(project_path));
    }

    config
}

/// Get the global config path (~/.capture/capture.toml).
pub fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".capture").join("capture.toml"))
}

/// Get the project config path (.capture/capture.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".capture").join("capture.toml")
}
