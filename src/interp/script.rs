//! The build-script interpreter.
//!
//! Reads one build-description file, extracts recognized command
//! invocations with a single combined matcher, strips comments with a
//! quote-parity-aware pass, and dispatches each invocation against the
//! file's scope.

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::core::Scope;
use crate::interp::commands::{dispatch, BranchState, CommandKind, ParseError};
use crate::util::fs::relative_path;

/// File name of a directory's build-description script.
pub const SCRIPT_FILE_NAME: &str = "CMakeLists.txt";

/// Why a single file could not be interpreted. The tree walker recovers
/// from every variant; none aborts the traversal.
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("build script not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Root and build-root paths of the project under analysis.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub build_root: PathBuf,
}

impl ProjectPaths {
    /// Map a source directory to its mirror under the build root.
    pub fn binary_dir(&self, source_dir: &Path) -> PathBuf {
        if source_dir == self.root {
            self.build_root.clone()
        } else {
            self.build_root.join(relative_path(&self.root, source_dir))
        }
    }
}

/// Interprets build-description files into populated scopes.
pub struct Interpreter {
    paths: ProjectPaths,
    matcher: Regex,
}

impl Interpreter {
    pub fn new(paths: ProjectPaths) -> Self {
        // One alternation over the closed command set, longest name first,
        // so `set` can never shadow `set_property`. The trailing `\s*\(`
        // keeps a prefix from matching inside a longer unknown name.
        let alternation = CommandKind::names_longest_first().join("|");
        let matcher = Regex::new(&format!(r"\b({alternation})\s*\(")).expect("static pattern");
        Interpreter { paths, matcher }
    }

    /// Interpret one file, producing its populated scope.
    ///
    /// With no parent this is the project's top-level file and the scope is
    /// seeded with the well-known path variables; otherwise the scope
    /// derives from `parent` per the inheritance rules.
    pub fn interpret(
        &self,
        script_path: &Path,
        parent: Option<&Scope>,
    ) -> Result<Scope, InterpretError> {
        if !script_path.exists() {
            return Err(InterpretError::NotFound(script_path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(script_path).map_err(|source| InterpretError::Io {
            path: script_path.to_path_buf(),
            source,
        })?;
        let text = strip_comments(raw.trim_start());

        let source_dir = script_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.root.clone());
        let binary_dir = self.paths.binary_dir(&source_dir);

        let mut scope = match parent {
            Some(parent) => parent.child(&source_dir, &binary_dir),
            None => Scope::root(&self.paths.root, &self.paths.build_root),
        };

        let mut branches = BranchState::default();
        for (name, args) in find_commands(&self.matcher, &text)? {
            // The matcher only emits recognized names; anything else in the
            // file was skipped before we got here.
            let Some(kind) = CommandKind::from_name(name) else {
                continue;
            };
            tracing::trace!(command = name, "dispatching");
            dispatch(kind, args, &mut scope, &mut branches)?;
        }

        tracing::debug!("interpreted {}", script_path.display());
        Ok(scope)
    }
}

/// Extract `(name, argument-text)` pairs for every recognized invocation.
///
/// The argument text is taken by a balanced-parenthesis scan that ignores
/// parentheses inside double-quoted strings.
fn find_commands<'t>(
    matcher: &Regex,
    text: &'t str,
) -> Result<Vec<(&'t str, &'t str)>, ParseError> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(caps) = matcher.captures(&text[pos..]) {
        let name = caps.get(1).expect("group 1 always present");
        let whole = caps.get(0).expect("group 0 always present");
        let open = pos + whole.end() - 1;

        let close = match argument_end(text, open) {
            Some(close) => close,
            None => return Err(ParseError::Unbalanced(name.as_str().to_string())),
        };
        found.push((name.as_str(), &text[open + 1..close]));
        pos = close + 1;
    }
    Ok(found)
}

/// Index of the `)` matching the `(` at `open`, or `None` if unbalanced.
fn argument_end(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove `#` comments, preserving `#` inside double-quoted strings.
///
/// Quote parity carries across lines: a `#` only starts a comment when the
/// count of unescaped double quotes seen so far is even.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;

    for (n, line) in text.lines().enumerate() {
        if n > 0 {
            out.push('\n');
        }
        let mut escaped = false;
        let mut cut = line.len();
        for (i, ch) in line.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = !in_string,
                '#' if !in_string => {
                    cut = i;
                    break;
                }
                _ => {}
            }
        }
        out.push_str(line[..cut].trim_end());
    }
    out
}
