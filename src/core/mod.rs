//! Core data structures for capture.
//!
//! - Per-directory configuration scopes and value records
//! - Source-info groups and compile command records

pub mod scope;
pub mod source_info;

pub use scope::{Scope, TargetKind, TargetRecord, ValueRecord};
pub use source_info::{CompileCommand, CompilerKind, SourceInfo};
