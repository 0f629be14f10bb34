//! Dry-run build tracing for make- and scons-driven projects.
//!
//! The build tool is asked to print its commands without running them;
//! compiler invocations are then parsed back into per-file option sets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::core::{CompilerKind, SourceInfo};
use crate::detect::BuildSystem;
use crate::util::process::{find_executable, ProcessBuilder};

/// One compiler invocation recovered from a build trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceCommand {
    pub file: PathBuf,
    pub directory: PathBuf,
    pub includes: Vec<String>,
    pub definitions: Vec<String>,
    pub flags: Vec<String>,
    pub compiler: CompilerKind,
}

/// Run the build tool in no-execute mode and return its trace output.
pub fn trace_build(kind: BuildSystem, build_dir: &Path, extra_args: &[String]) -> Result<String> {
    let (tool, args): (&str, &[&str]) = match kind {
        // -n prints commands, -k keeps going past errors, -w prints
        // directory change markers.
        BuildSystem::Make => ("make", &["-n", "-k", "-w"]),
        BuildSystem::Scons => ("scons", &["-n", "--tree=none"]),
        other => bail!("build system `{}` cannot be traced", other.as_str()),
    };
    let Some(program) = find_executable(tool) else {
        bail!("`{tool}` not found in PATH");
    };

    let output = ProcessBuilder::new(program)
        .args(args)
        .args(extra_args)
        .cwd(build_dir)
        .exec()?;
    // -k traces can end unsuccessfully while still printing useful
    // commands, so the status is not checked here.
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push('\n');
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

const COMPILER_NAMES: &[&str] = &[
    "cc", "gcc", "clang", "c++", "g++", "clang++", "tcc", "icc",
];

fn compiler_of(token: &str) -> Option<CompilerKind> {
    let base = Path::new(token).file_name()?.to_str()?;
    if !COMPILER_NAMES.contains(&base) {
        return None;
    }
    if base.ends_with("++") {
        Some(CompilerKind::Cxx)
    } else {
        Some(CompilerKind::C)
    }
}

/// Parse a build trace into compiler invocations.
///
/// Lines are shell-tokenized; `Entering directory` markers from `make -w`
/// update the working directory attributed to subsequent commands, and a
/// `cd <dir> && ...` prefix within a recipe line moves the directory for
/// the rest of that line only.
pub fn parse_trace(text: &str, build_dir: &Path) -> Vec<TraceCommand> {
    let mut commands = Vec::new();
    let mut current_dir = build_dir.to_path_buf();

    for line in text.lines() {
        if let Some(rest) = line.split("Entering directory").nth(1) {
            let dir = rest.trim().trim_matches(|c| c == '\'' || c == '`' || c == '"');
            current_dir = PathBuf::from(dir);
            continue;
        }
        let Some(tokens) = shlex::split(line) else {
            continue;
        };
        let mut line_dir = current_dir.clone();
        for segment in tokens.split(|t| t == "&&" || t == ";") {
            let Some(head) = segment.first() else {
                continue;
            };
            if head == "cd" {
                if let Some(dir) = segment.get(1) {
                    let dir = PathBuf::from(dir);
                    line_dir = if dir.is_absolute() {
                        dir
                    } else {
                        line_dir.join(dir)
                    };
                }
                continue;
            }
            let Some(compiler) = compiler_of(head) else {
                continue;
            };
            if let Some(cmd) = parse_invocation(&segment[1..], compiler, &line_dir) {
                commands.push(cmd);
            }
        }
    }

    tracing::debug!("recovered {} compiler invocation(s) from trace", commands.len());
    commands
}

fn parse_invocation(
    args: &[String],
    compiler: CompilerKind,
    directory: &Path,
) -> Option<TraceCommand> {
    let mut includes = Vec::new();
    let mut definitions = Vec::new();
    let mut flags = Vec::new();
    let mut file = None;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(rest) = arg.strip_prefix("-I") {
            let dir = if rest.is_empty() {
                iter.next()?.clone()
            } else {
                rest.to_string()
            };
            includes.push(dir);
        } else if let Some(rest) = arg.strip_prefix("-D") {
            let def = if rest.is_empty() {
                iter.next()?.clone()
            } else {
                rest.to_string()
            };
            definitions.push(def);
        } else if arg == "-o" {
            iter.next();
        } else if arg == "-c" {
            // Source follows by convention, but is matched by extension
            // either way.
        } else if CompilerKind::from_source(Path::new(arg)).is_some() {
            file = Some(PathBuf::from(arg));
        } else if arg.starts_with('-') {
            flags.push(arg.clone());
        }
    }

    let file = file?;
    let file = if file.is_absolute() {
        file
    } else {
        directory.join(file)
    };
    Some(TraceCommand {
        file,
        directory: directory.to_path_buf(),
        includes,
        definitions,
        flags,
        compiler,
    })
}

/// Turn traced invocations into compile-unit records, one per invocation.
///
/// `leftovers` holds the sources the directory scan found; every traced
/// file is removed from it so the caller can tell which files the build
/// never compiles.
pub fn from_trace(commands: &[TraceCommand], leftovers: &mut Vec<PathBuf>) -> Vec<SourceInfo> {
    let mut records = Vec::new();
    for cmd in commands {
        let before = leftovers.len();
        leftovers.retain(|p| p != &cmd.file);
        if leftovers.len() == before {
            tracing::debug!(
                "traced file not present in source scan: {}",
                cmd.file.display()
            );
        }

        let mut record = SourceInfo::new(cmd.compiler, cmd.directory.clone());
        record.source_files = vec![cmd.file.clone()];
        record.includes = cmd.includes.clone();
        record.definitions = cmd.definitions.clone();
        record.flags = cmd.flags.clone();
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace_extracts_options() {
        let trace = "gcc -O2 -Iinclude -DFOO=1 -D BAR -I /usr/local/include -c src/main.c -o main.o\n";
        let commands = parse_trace(trace, Path::new("/proj"));

        assert_eq!(commands.len(), 1);
        let cmd = &commands[0];
        assert_eq!(cmd.file, PathBuf::from("/proj/src/main.c"));
        assert_eq!(cmd.includes, vec!["include", "/usr/local/include"]);
        assert_eq!(cmd.definitions, vec!["FOO=1", "BAR"]);
        assert_eq!(cmd.flags, vec!["-O2"]);
        assert_eq!(cmd.compiler, CompilerKind::C);
    }

    #[test]
    fn test_parse_trace_tracks_directory_markers() {
        let trace = "\
make[1]: Entering directory '/proj/sub'
g++ -c widget.cpp -o widget.o
";
        let commands = parse_trace(trace, Path::new("/proj"));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].directory, PathBuf::from("/proj/sub"));
        assert_eq!(commands[0].file, PathBuf::from("/proj/sub/widget.cpp"));
        assert_eq!(commands[0].compiler, CompilerKind::Cxx);
    }

    #[test]
    fn test_parse_trace_ignores_non_compiler_lines() {
        let trace = "\
echo building
ar rcs libfoo.a foo.o
gcc -c foo.c -o foo.o
";
        let commands = parse_trace(trace, Path::new("/proj"));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].file, PathBuf::from("/proj/foo.c"));
    }

    #[test]
    fn test_parse_trace_follows_cd_prefix() {
        let trace = "cd sub && gcc -c part.c -o part.o\ngcc -c top.c -o top.o\n";
        let commands = parse_trace(trace, Path::new("/proj"));

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].directory, PathBuf::from("/proj/sub"));
        assert_eq!(commands[0].file, PathBuf::from("/proj/sub/part.c"));
        // The cd prefix is scoped to its own line.
        assert_eq!(commands[1].directory, PathBuf::from("/proj"));
    }

    #[test]
    fn test_parse_trace_compiler_path_prefix() {
        let trace = "/usr/bin/clang++ -c a.cc -o a.o\n";
        let commands = parse_trace(trace, Path::new("/p"));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].compiler, CompilerKind::Cxx);
    }

    #[test]
    fn test_from_trace_consumes_leftovers() {
        let trace = "gcc -c a.c -o a.o\n";
        let commands = parse_trace(trace, Path::new("/p"));
        let mut leftovers = vec![PathBuf::from("/p/a.c"), PathBuf::from("/p/b.c")];

        let records = from_trace(&commands, &mut leftovers);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_files, vec![PathBuf::from("/p/a.c")]);
        assert_eq!(leftovers, vec![PathBuf::from("/p/b.c")]);
    }

    #[test]
    fn test_trace_build_rejects_untraceable_kind() {
        let err = trace_build(BuildSystem::Other, Path::new("/p"), &[]).unwrap_err();
        assert!(err.to_string().contains("cannot be traced"));
    }
}
