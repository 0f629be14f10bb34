//! High-level operations.

pub mod capture;

pub use capture::{run, CaptureOptions, CaptureSummary};
