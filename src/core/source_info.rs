//! Grouped source records and synthesized compile commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which compiler front end a source file needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerKind {
    C,
    Cxx,
}

impl CompilerKind {
    /// Classify a source file by extension. Headers and unknown extensions
    /// return `None`.
    pub fn from_source(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "c" => Some(CompilerKind::C),
            "cc" | "cpp" | "cxx" => Some(CompilerKind::Cxx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompilerKind::C => "C",
            CompilerKind::Cxx => "CXX",
        }
    }
}

/// A compile-unit group: source files sharing one execution context.
///
/// Sequences stay in the order the producer accumulated them; deduplication
/// is the producer's concern. `custom_flags`/`custom_definitions` override
/// per file, keyed by index into `source_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_files: Vec<PathBuf>,
    pub includes: Vec<String>,
    pub definitions: Vec<String>,
    pub flags: Vec<String>,
    pub exec_directory: PathBuf,
    pub compiler_kind: CompilerKind,
    #[serde(default)]
    pub custom_flags: BTreeMap<usize, Vec<String>>,
    #[serde(default)]
    pub custom_definitions: BTreeMap<usize, Vec<String>>,
}

impl SourceInfo {
    /// An empty group for the given compiler kind and execution directory.
    pub fn new(compiler_kind: CompilerKind, exec_directory: PathBuf) -> Self {
        SourceInfo {
            source_files: Vec::new(),
            includes: Vec::new(),
            definitions: Vec::new(),
            flags: Vec::new(),
            exec_directory,
            compiler_kind,
            custom_flags: BTreeMap::new(),
            custom_definitions: BTreeMap::new(),
        }
    }
}

/// One synthesized compiler invocation for a (source file, option set) pair.
///
/// Never mutated after creation; regeneration produces a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
    pub command: String,
    pub fingerprint: String,
    /// Parallel bitcode-emitting invocation, when requested.
    pub bitcode_command: Option<String>,
}

impl CompileCommand {
    /// The `compile_commands.json` entry for this record.
    pub fn db_entry(&self) -> CommandDbEntry<'_> {
        CommandDbEntry {
            directory: &self.directory,
            file: &self.file,
            command: &self.command,
        }
    }

    /// The bitcode database entry, if a bitcode command was generated.
    pub fn bitcode_db_entry(&self) -> Option<CommandDbEntry<'_>> {
        self.bitcode_command.as_deref().map(|command| CommandDbEntry {
            directory: &self.directory,
            file: &self.file,
            command,
        })
    }
}

/// Borrowed view serialized into the compile-command databases.
#[derive(Debug, Serialize)]
pub struct CommandDbEntry<'a> {
    pub directory: &'a Path,
    pub file: &'a Path,
    pub command: &'a str,
}
