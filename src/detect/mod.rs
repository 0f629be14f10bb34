//! Project inspection: build-system detection, source scanning, and
//! flattening interpreted scopes into compile-unit records.

pub mod trace;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use walkdir::WalkDir;

use crate::core::{CompilerKind, Scope, SourceInfo};
use crate::interp::ScopeTree;
use crate::util::config::CaptureConfig;

pub use trace::{parse_trace, trace_build, TraceCommand};

/// The build system steering a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystem {
    Cmake,
    Make,
    Scons,
    Other,
}

impl BuildSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildSystem::Cmake => "cmake",
            BuildSystem::Make => "make",
            BuildSystem::Scons => "scons",
            BuildSystem::Other => "other",
        }
    }
}

impl FromStr for BuildSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cmake" => Ok(BuildSystem::Cmake),
            "make" | "makefile" => Ok(BuildSystem::Make),
            "scons" => Ok(BuildSystem::Scons),
            "other" => Ok(BuildSystem::Other),
            other => Err(format!("unknown build system: {other}")),
        }
    }
}

/// Detection result: the build system and the directory builds run from.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub kind: BuildSystem,
    pub build_dir: PathBuf,
}

/// Detect the build system by marker files, in priority order. `forced`
/// pins the kind; `build_path` overrides the build directory.
pub fn detect(root: &Path, forced: Option<BuildSystem>, build_path: Option<&Path>) -> Detection {
    let kind = forced.unwrap_or_else(|| {
        if root.join(crate::interp::SCRIPT_FILE_NAME).exists() {
            BuildSystem::Cmake
        } else if root.join("configure").exists() || root.join("Makefile").exists() {
            BuildSystem::Make
        } else if root.join("SConstruct").exists() {
            BuildSystem::Scons
        } else {
            BuildSystem::Other
        }
    });

    let build_dir = match build_path {
        Some(path) => path.to_path_buf(),
        // Script interpretation mirrors sources into a separate tree; the
        // trace-based systems run in place.
        None if kind == BuildSystem::Cmake => root.join("output").join("build"),
        None => root.to_path_buf(),
    };

    tracing::info!("detected build system: {}", kind.as_str());
    Detection { kind, build_dir }
}

/// Everything found by walking the project's source tree.
#[derive(Debug, Default, Serialize)]
pub struct ProjectLayout {
    pub sub_paths: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub headers: Vec<PathBuf>,
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Walk the tree under `root`, collecting directories, sources, and
/// headers. Hidden entries are skipped. A non-empty `prefers` list limits
/// the walk to those top-level subdirectories (plus the root itself).
pub fn scan_sources(root: &Path, prefers: &[String]) -> ProjectLayout {
    let roots: Vec<PathBuf> = if prefers.is_empty() {
        vec![root.to_path_buf()]
    } else {
        prefers.iter().map(|p| root.join(p)).collect()
    };

    let mut layout = ProjectLayout::default();
    for walk_root in roots {
        // Depth 0 is the walk root itself; its name must not disqualify
        // the whole tree.
        for entry in WalkDir::new(&walk_root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if entry.file_type().is_dir() {
                layout.sub_paths.push(path.to_path_buf());
                continue;
            }
            match path.extension().and_then(|e| e.to_str()) {
                Some("c" | "cc" | "cpp" | "cxx") => layout.sources.push(path.to_path_buf()),
                Some("h" | "hh" | "hpp" | "hxx") => layout.headers.push(path.to_path_buf()),
                _ => {}
            }
        }
    }
    layout.sub_paths.sort();
    layout.sources.sort();
    layout.headers.sort();

    tracing::debug!(
        "scanned {} source(s), {} header(s)",
        layout.sources.len(),
        layout.headers.len()
    );
    layout
}

/// Fallback compile-unit records built from the config defaults alone, one
/// per compiler kind present in the layout. Directories holding headers
/// become the include set.
pub fn default_records(
    layout: &ProjectLayout,
    config: &CaptureConfig,
    exec_directory: &Path,
) -> Vec<SourceInfo> {
    let include_dirs: BTreeSet<String> = layout
        .headers
        .iter()
        .filter_map(|h| h.parent())
        .map(|d| d.display().to_string())
        .collect();

    let mut records = Vec::new();
    for kind in [CompilerKind::C, CompilerKind::Cxx] {
        let sources: Vec<PathBuf> = layout
            .sources
            .iter()
            .filter(|s| CompilerKind::from_source(s) == Some(kind))
            .cloned()
            .collect();
        if sources.is_empty() {
            continue;
        }

        let mut record = SourceInfo::new(kind, exec_directory.to_path_buf());
        record.source_files = sources;
        record.includes = include_dirs.iter().cloned().collect();
        record.definitions = config.defaults.macros.clone();
        record.flags = config.defaults.flags.clone();
        if kind == CompilerKind::Cxx {
            record.flags.extend(config.defaults.cxx_flags.iter().cloned());
        }
        records.push(record);
    }
    records
}

/// Flatten an interpreted scope tree into compile-unit records, one per
/// (target, compiler kind) pair, resolving every conditional accumulator
/// against the tree's shared option cache.
pub fn flatten_scopes(tree: &ScopeTree, config: &CaptureConfig) -> Vec<SourceInfo> {
    let mut records = Vec::new();
    for node in tree.iter() {
        records.extend(flatten_one(&node.path, &node.scope, config));
    }
    tracing::info!("flattened {} compile-unit record(s)", records.len());
    records
}

fn flatten_one(dir: &Path, scope: &Scope, config: &CaptureConfig) -> Vec<SourceInfo> {
    let options = scope.config_option.borrow();
    let shared_flags = scope.flags.resolve(&options);
    let shared_defs = scope.definitions.resolve(&options);
    let shared_incs = scope.includes.resolve(&options);

    let mut records = Vec::new();
    for target in scope.target.values() {
        for kind in [CompilerKind::C, CompilerKind::Cxx] {
            let sources: Vec<PathBuf> = target
                .sources
                .iter()
                .map(|s| absolutize_in(dir, s))
                .filter(|s| CompilerKind::from_source(s) == Some(kind))
                .collect();
            if sources.is_empty() {
                continue;
            }

            let mut record = SourceInfo::new(kind, dir.to_path_buf());
            record.source_files = sources;
            record.flags = config.defaults.flags.clone();
            record.flags.extend(shared_flags.iter().cloned());
            if kind == CompilerKind::Cxx {
                record.flags.extend(config.defaults.cxx_flags.iter().cloned());
            }
            record.definitions = config.defaults.macros.clone();
            record.definitions.extend(shared_defs.iter().cloned());
            record.includes = shared_incs.clone();
            record
                .includes
                .extend(target.includes.iter().map(|i| absolutize_in(dir, i).display().to_string()));
            records.push(record);
        }
    }
    records
}

fn absolutize_in(dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        dir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_priority() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Makefile"), "").unwrap();
        std::fs::write(tmp.path().join("SConstruct"), "").unwrap();
        assert_eq!(detect(tmp.path(), None, None).kind, BuildSystem::Make);

        std::fs::write(tmp.path().join("CMakeLists.txt"), "").unwrap();
        assert_eq!(detect(tmp.path(), None, None).kind, BuildSystem::Cmake);
    }

    #[test]
    fn test_detect_forced_and_build_path() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("CMakeLists.txt"), "").unwrap();

        let detection = detect(
            tmp.path(),
            Some(BuildSystem::Other),
            Some(Path::new("/elsewhere")),
        );
        assert_eq!(detection.kind, BuildSystem::Other);
        assert_eq!(detection.build_dir, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_detect_nothing_is_other() {
        let tmp = TempDir::new().unwrap();
        let detection = detect(tmp.path(), None, None);
        assert_eq!(detection.kind, BuildSystem::Other);
        assert_eq!(detection.build_dir, tmp.path());
    }

    #[test]
    fn test_scan_sources_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join("src/main.c"), "").unwrap();
        std::fs::write(tmp.path().join("src/util.hpp"), "").unwrap();
        std::fs::write(tmp.path().join(".git/junk.c"), "").unwrap();

        let layout = scan_sources(tmp.path(), &[]);
        assert_eq!(layout.sources, vec![tmp.path().join("src/main.c")]);
        assert_eq!(layout.headers, vec![tmp.path().join("src/util.hpp")]);
    }

    #[test]
    fn test_scan_sources_from_hidden_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".proj");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/main.c"), "").unwrap();
        std::fs::write(root.join("top.c"), "").unwrap();

        let layout = scan_sources(&root, &[]);
        assert_eq!(
            layout.sources,
            vec![root.join("src/main.c"), root.join("top.c")]
        );
    }

    #[test]
    fn test_scan_sources_prefers() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("lib")).unwrap();
        std::fs::create_dir_all(tmp.path().join("tools")).unwrap();
        std::fs::write(tmp.path().join("lib/a.c"), "").unwrap();
        std::fs::write(tmp.path().join("tools/b.c"), "").unwrap();

        let layout = scan_sources(tmp.path(), &["lib".to_string()]);
        assert_eq!(layout.sources, vec![tmp.path().join("lib/a.c")]);
    }

    #[test]
    fn test_default_records_group_by_kind() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("inc")).unwrap();
        std::fs::write(tmp.path().join("a.c"), "").unwrap();
        std::fs::write(tmp.path().join("b.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("inc/x.h"), "").unwrap();

        let config = CaptureConfig::default();
        let layout = scan_sources(tmp.path(), &[]);
        let records = default_records(&layout, &config, tmp.path());

        assert_eq!(records.len(), 2);
        let c = &records[0];
        assert_eq!(c.compiler_kind, CompilerKind::C);
        assert_eq!(c.source_files, vec![tmp.path().join("a.c")]);
        assert_eq!(c.includes, vec![tmp.path().join("inc").display().to_string()]);
        assert_eq!(c.flags, config.defaults.flags);

        let cxx = &records[1];
        assert_eq!(cxx.compiler_kind, CompilerKind::Cxx);
        assert_eq!(cxx.source_files, vec![tmp.path().join("b.cpp")]);
    }

    #[test]
    fn test_flatten_resolves_targets_against_options() {
        use crate::core::{TargetKind, TargetRecord, ValueRecord};

        let root = Path::new("/proj");
        let mut scope = Scope::root(root, Path::new("/proj/build"));
        scope.config_option.borrow_mut().insert("FAST".to_string(), true);
        scope.flags.defined.push("-Wall".to_string());
        scope
            .flags
            .option
            .insert("FAST".to_string(), ValueRecord::single("-O3"));
        scope.definitions.defined.push("CORE".to_string());
        scope.includes.defined.push("/proj/include".to_string());

        let mut target = TargetRecord::new(
            TargetKind::Library,
            vec!["a.c".to_string(), "b.cpp".to_string()],
        );
        target.includes.push("private".to_string());
        scope.target.insert("mylib".to_string(), target);

        let config = CaptureConfig::default();
        let records = flatten_one(root, &scope, &config);

        assert_eq!(records.len(), 2);
        let c = &records[0];
        assert_eq!(c.compiler_kind, CompilerKind::C);
        assert_eq!(c.source_files, vec![PathBuf::from("/proj/a.c")]);
        assert_eq!(c.exec_directory, PathBuf::from("/proj"));
        assert_eq!(c.flags, vec!["-g", "-Wall", "-O3"]);
        assert_eq!(c.definitions, vec!["CORE"]);
        assert_eq!(c.includes, vec!["/proj/include", "/proj/private"]);

        let cxx = &records[1];
        assert_eq!(cxx.compiler_kind, CompilerKind::Cxx);
        assert_eq!(cxx.source_files, vec![PathBuf::from("/proj/b.cpp")]);
    }

    #[test]
    fn test_default_records_skip_empty_groups() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("only.c"), "").unwrap();

        let config = CaptureConfig::default();
        let layout = scan_sources(tmp.path(), &[]);
        let records = default_records(&layout, &config, tmp.path());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].compiler_kind, CompilerKind::C);
    }
}
