//! Capture - compile-command reconstruction for C/C++ projects
//!
//! This crate recovers a per-translation-unit compile command database
//! for projects that never produce one themselves, by interpreting their
//! build scripts, tracing their build tools, or falling back to
//! configured defaults.

pub mod builder;
pub mod core;
pub mod detect;
pub mod interp;
pub mod ops;
pub mod util;

pub use crate::core::{CompileCommand, CompilerKind, Scope, SourceInfo};
pub use crate::detect::{BuildSystem, Detection};
pub use crate::interp::{ProjectPaths, ScopeTree};
pub use crate::ops::{CaptureOptions, CaptureSummary};
pub use crate::util::config::CaptureConfig;
