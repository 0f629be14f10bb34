//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

use capture::BuildSystem;

/// Reconstruct per-file compile commands for C/C++ projects.
#[derive(Debug, Parser)]
#[command(name = "capture", version, about)]
pub struct Cli {
    /// Root directory of the project to analyze
    pub project_root: PathBuf,

    /// Directory receiving objects, databases, and reports
    pub output_dir: PathBuf,

    /// Pin the build system instead of detecting it (cmake, make, scons, other)
    #[arg(short = 't', long = "build-type")]
    pub build_type: Option<BuildSystem>,

    /// Override the directory builds run from
    #[arg(short = 'b', long = "build-path")]
    pub build_path: Option<PathBuf>,

    /// Comma-separated subdirectories to limit source scanning to
    #[arg(short = 'p', long = "prefers", value_delimiter = ',')]
    pub prefers: Vec<String>,

    /// Named compiler pair from the configuration
    #[arg(short = 'c', long = "compiler-id")]
    pub compiler_id: Option<String>,

    /// Also synthesize and run bitcode-emitting twin commands
    #[arg(long)]
    pub generate_bitcode: bool,

    /// Treat every command as stale, ignoring the incremental store
    #[arg(long)]
    pub update_all: bool,

    /// Extra arguments passed to the traced build tool
    #[arg(long = "extra-build-args", value_delimiter = ' ')]
    pub extra_build_args: Vec<String>,

    /// Report stale files instead of compiling them
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Number of parallel jobs
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::parse_from(["capture", "/proj", "/out"]);
        assert_eq!(cli.project_root, PathBuf::from("/proj"));
        assert_eq!(cli.output_dir, PathBuf::from("/out"));
        assert!(cli.build_type.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_parse_full() {
        let cli = Cli::parse_from([
            "capture",
            "/proj",
            "/out",
            "-t",
            "make",
            "-p",
            "lib,tools",
            "-c",
            "clang",
            "--generate-bitcode",
            "-n",
            "-j",
            "4",
        ]);
        assert_eq!(cli.build_type, Some(BuildSystem::Make));
        assert_eq!(cli.prefers, vec!["lib", "tools"]);
        assert_eq!(cli.compiler_id.as_deref(), Some("clang"));
        assert!(cli.generate_bitcode);
        assert!(cli.dry_run);
        assert_eq!(cli.jobs, Some(4));
    }
}
