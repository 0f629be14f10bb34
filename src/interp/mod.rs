//! Build-script interpretation: the recognized command set, the
//! per-file interpreter, and the breadth-first project walker.

pub mod commands;
pub mod script;
pub mod walker;

pub use commands::{BranchState, CommandKind, ParseError};
pub use script::{strip_comments, Interpreter, InterpretError, ProjectPaths, SCRIPT_FILE_NAME};
pub use walker::{walk_project, ScopeNode, ScopeTree};
