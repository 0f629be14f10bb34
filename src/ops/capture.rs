//! Implementation of the capture pipeline.
//!
//! Detects the build system, recovers per-file compile options (by script
//! interpretation, build tracing, or configured defaults), synthesizes one
//! command per translation unit, filters against the incremental store,
//! and either runs the commands or reports what would run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::{
    filter_stale, BuildMetadata, CommandExecutor, CommandSynthesizer, IncrementalStore, JsonStore,
};
use crate::core::{CompileCommand, SourceInfo};
use crate::detect::{
    self, default_records, flatten_scopes, scan_sources, trace::from_trace, BuildSystem, Detection,
};
use crate::interp::{walk_project, ProjectPaths};
use crate::util::config::{self, CaptureConfig};
use crate::util::fs::{ensure_dir, normalize_path, write_string};

/// File name of the incremental store inside the output directory.
const STORE_FILE_NAME: &str = "incremental_store.json";

/// Options for the capture pipeline.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    /// Project root to analyze.
    pub project_root: PathBuf,

    /// Directory receiving objects, databases, and reports.
    pub output_dir: PathBuf,

    /// Pin the build system instead of detecting it.
    pub build_type: Option<BuildSystem>,

    /// Override the directory builds run from.
    pub build_path: Option<PathBuf>,

    /// Limit source scanning to these top-level subdirectories.
    pub prefers: Vec<String>,

    /// Named compiler pair overriding the configured default.
    pub compiler_id: Option<String>,

    /// Also synthesize and run bitcode-emitting twin commands.
    pub generate_bitcode: bool,

    /// Treat every command as stale, ignoring the store.
    pub update_all: bool,

    /// Extra arguments appended to the traced build tool.
    pub extra_build_args: Vec<String>,

    /// Report stale files instead of compiling them.
    pub dry_run: bool,

    /// Number of parallel jobs.
    pub jobs: Option<usize>,

    /// Verbose logging; suppresses the execution progress bar.
    pub verbose: bool,
}

/// What a capture run did.
#[derive(Debug, Default)]
pub struct CaptureSummary {
    pub total_commands: usize,
    pub stale: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Run the full capture pipeline.
pub fn run(options: &CaptureOptions) -> Result<CaptureSummary> {
    let root = normalize_path(&options.project_root);
    let output_dir = normalize_path(&options.output_dir);
    ensure_dir(&output_dir)?;

    let config = config::load_merged(&root);
    let compiler_id = options
        .compiler_id
        .as_deref()
        .unwrap_or(&config.defaults.compiler_id);
    let compilers = config.resolve_compiler(compiler_id);
    let bitcode = options.generate_bitcode.then(|| config.bitcode.clone());

    let detection = detect::detect(&root, options.build_type, options.build_path.as_deref());
    let layout = scan_sources(&root, &options.prefers);

    let records = collect_records(
        &root,
        &output_dir,
        &detection,
        &layout,
        &config,
        &options.extra_build_args,
    )?;
    dump_json(&output_dir.join("project_scan_result.json"), &records)?;

    let synthesizer = CommandSynthesizer::new(compilers, bitcode, &output_dir);
    let commands = synthesizer.synthesize(&records, options.jobs)?;

    dump_command_db(&output_dir.join("compile_commands.json"), &commands, false)?;
    if options.generate_bitcode {
        dump_command_db(&output_dir.join("compile_commands_bc.json"), &commands, true)?;
    }

    let mut store = JsonStore::load(&output_dir.join(STORE_FILE_NAME))?;
    let stale = filter_stale(commands.clone(), &store, options.update_all);

    let mut summary = CaptureSummary {
        total_commands: commands.len(),
        stale: stale.len(),
        ..CaptureSummary::default()
    };

    if options.dry_run {
        write_stale_report(&output_dir.join("files.out"), &stale)?;
        return Ok(summary);
    }

    let outcomes = CommandExecutor::new(options.jobs, !options.verbose).execute(&stale)?;
    for outcome in &outcomes {
        if outcome.success {
            summary.succeeded += 1;
            let cmd = stale
                .iter()
                .find(|c| c.fingerprint == outcome.fingerprint)
                .context("outcome without a matching command")?;
            store.record(&outcome.fingerprint, BuildMetadata::of(cmd));
        } else {
            summary.failed += 1;
        }
    }
    store.save()?;

    Ok(summary)
}

/// Produce compile-unit records for the detected build system.
///
/// Sources no target or trace claimed get trailing default records, so
/// every scanned translation unit ends up with a compile command.
fn collect_records(
    root: &Path,
    output_dir: &Path,
    detection: &Detection,
    layout: &detect::ProjectLayout,
    config: &CaptureConfig,
    extra_build_args: &[String],
) -> Result<Vec<SourceInfo>> {
    match detection.kind {
        BuildSystem::Cmake => {
            let paths = ProjectPaths {
                root: root.to_path_buf(),
                build_root: detection.build_dir.clone(),
            };
            let tree = walk_project(&paths);
            tree.dump(&output_dir.join("scope_tree.json"))?;

            let mut records = flatten_scopes(&tree, config);
            let trailing = leftover_defaults(&records, layout, config, root);
            records.extend(trailing);
            Ok(records)
        }
        kind @ (BuildSystem::Make | BuildSystem::Scons) => {
            match detect::trace_build(kind, &detection.build_dir, extra_build_args) {
                Ok(trace) => {
                    let invocations = detect::parse_trace(&trace, &detection.build_dir);
                    let mut leftovers = layout.sources.clone();
                    let mut records = from_trace(&invocations, &mut leftovers);
                    let trailing = leftover_defaults(&records, layout, config, root);
                    records.extend(trailing);
                    Ok(records)
                }
                Err(err) => {
                    tracing::warn!("build trace failed, using defaults: {err}");
                    Ok(default_records(layout, config, root))
                }
            }
        }
        BuildSystem::Other => Ok(default_records(layout, config, root)),
    }
}

/// Trailing default records covering every scanned source no record claimed.
fn leftover_defaults(
    records: &[SourceInfo],
    layout: &detect::ProjectLayout,
    config: &CaptureConfig,
    root: &Path,
) -> Vec<SourceInfo> {
    let claimed: BTreeSet<&PathBuf> = records.iter().flat_map(|r| &r.source_files).collect();
    let leftover = detect::ProjectLayout {
        sub_paths: Vec::new(),
        sources: layout
            .sources
            .iter()
            .filter(|s| !claimed.contains(s))
            .cloned()
            .collect(),
        headers: layout.headers.clone(),
    };
    default_records(&leftover, config, root)
}

fn dump_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_string(path, &json)
}

fn dump_command_db(path: &Path, commands: &[CompileCommand], bitcode: bool) -> Result<()> {
    let entries: Vec<_> = if bitcode {
        commands.iter().filter_map(|c| c.bitcode_db_entry()).collect()
    } else {
        commands.iter().map(|c| c.db_entry()).collect()
    };
    dump_json(path, &entries)
}

/// Sorted list of the files a non-dry run would compile.
fn write_stale_report(path: &Path, stale: &[CompileCommand]) -> Result<()> {
    let mut files: Vec<String> = stale.iter().map(|c| c.file.display().to_string()).collect();
    files.sort();
    let mut text = files.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    write_string(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(root: &Path, out: &Path) -> CaptureOptions {
        CaptureOptions {
            project_root: root.to_path_buf(),
            output_dir: out.to_path_buf(),
            dry_run: true,
            jobs: Some(2),
            ..CaptureOptions::default()
        }
    }

    #[test]
    fn test_dry_run_default_project() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("main.c"), "int main(void) { return 0; }\n").unwrap();
        let out = tmp.path().join("out");

        let summary = run(&options(&root, &out)).unwrap();
        assert_eq!(summary.total_commands, 1);
        assert_eq!(summary.stale, 1);

        let db = std::fs::read_to_string(out.join("compile_commands.json")).unwrap();
        assert!(db.contains("main.c"));
        let report = std::fs::read_to_string(out.join("files.out")).unwrap();
        assert!(report.trim().ends_with("main.c"));
        // Dry runs never touch the store.
        assert!(!out.join(STORE_FILE_NAME).exists());
    }

    #[test]
    fn test_cmake_project_writes_scope_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("CMakeLists.txt"),
            "project(demo C)\nadd_executable(demo main.c)\n",
        )
        .unwrap();
        std::fs::write(root.join("main.c"), "int main(void) { return 0; }\n").unwrap();
        let out = tmp.path().join("out");

        let summary = run(&options(&root, &out)).unwrap();
        assert_eq!(summary.total_commands, 1);
        assert!(out.join("scope_tree.json").exists());

        let scan = std::fs::read_to_string(out.join("project_scan_result.json")).unwrap();
        assert!(scan.contains("main.c"));
    }

    #[test]
    fn test_unclaimed_sources_get_default_commands() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("CMakeLists.txt"),
            "project(demo C)\nadd_executable(demo main.c)\n",
        )
        .unwrap();
        std::fs::write(root.join("main.c"), "").unwrap();
        std::fs::write(root.join("orphan.c"), "").unwrap();
        let out = tmp.path().join("out");

        let summary = run(&options(&root, &out)).unwrap();
        assert_eq!(summary.total_commands, 2);

        let scan = std::fs::read_to_string(out.join("project_scan_result.json")).unwrap();
        assert!(scan.contains("orphan.c"));
        let db = std::fs::read_to_string(out.join("compile_commands.json")).unwrap();
        assert!(db.contains("orphan.c"));
        assert!(db.contains("main.c"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_records_successes_into_store() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        std::fs::create_dir_all(root.join(".capture")).unwrap();
        std::fs::write(root.join("main.c"), "").unwrap();
        // A pair whose front end always exits zero keeps the run hermetic.
        std::fs::write(
            root.join(".capture/capture.toml"),
            "[defaults]\ncompiler_id = \"nop\"\n\n[compilers.nop]\nc = \"true\"\ncxx = \"true\"\n",
        )
        .unwrap();
        let out = tmp.path().join("out");

        let mut opts = options(&root, &out);
        opts.dry_run = false;
        let summary = run(&opts).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);

        let store = std::fs::read_to_string(out.join(STORE_FILE_NAME)).unwrap();
        assert!(store.contains("main.c"));
    }
}
